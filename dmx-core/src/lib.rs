//! ESP-DMX update core - hardware-independent firmware self-update logic
//!
//! Version checking, TLS fragment negotiation and the update session state
//! machine live here so they can be tested on the host platform. The firmware
//! crate plugs ESP-IDF implementations into the traits exposed by each module.

pub mod checker;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod release;
pub mod session;
pub mod status;
pub mod transport;
pub mod url;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use checker::{HttpFetch, UpdateCheckState, VersionChecker};
pub use config::{Config, ConfigUpdate};
pub use error::{CheckError, ConfigError, FlashError, ParseError, SessionError, TransportError, UpdateFailure};
pub use orchestrator::{FirmwareDownload, Restarter, UpdateOrchestrator, UpdateOutcome, UpdateResult};
pub use release::{ReleaseMetadata, UpdateDecision, UpdateTarget};
pub use session::{FlashSink, Phase, SessionResult, UpdateSession, UpdateSource};
pub use status::{LedColor, StatusSignal, UpdateSignal};
pub use transport::{BoundedStream, SecureConnector, SecureDownload};
pub use version::FirmwareVersion;

/// Hands control back to the runtime so its idle task can feed the watchdog.
///
/// Called between probe attempts, streamed chunks and flash writes. It is a
/// scheduling obligation only; nothing is cancelled or suspended.
pub trait Yielder {
    fn yield_now(&self);
}

impl<F: Fn()> Yielder for F {
    fn yield_now(&self) {
        self()
    }
}
