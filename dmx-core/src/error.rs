/// Error taxonomy for the firmware update core
use thiserror::Error;

/// Connection, probe or HTTP status failure while talking to the firmware host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect to {host}:{port} failed (code {code})")]
    Connect { host: String, port: u16, code: i32 },
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("connection closed before a status line was received")]
    NoStatus,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

impl TransportError {
    /// Numeric code shown to the operator next to the message.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Connect { code, .. } => *code,
            TransportError::Status(status) => i32::from(*status),
            TransportError::NoStatus => -1,
            TransportError::Io(_) => -2,
            TransportError::BodyTooLarge(_) => -3,
            TransportError::InvalidUrl(_) => -4,
        }
    }
}

/// The release metadata document could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("marker '{0}' not found")]
    MissingMarker(&'static str),
    #[error("invalid version token '{0}'")]
    InvalidVersion(String),
    #[error("empty firmware filename")]
    EmptyFilename,
}

/// A version check failed. Never fatal: the caller keeps its previous state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// The flash-write resource misbehaved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error("cannot open flash write session of {requested} bytes: {reason}")]
    Open { requested: usize, reason: String },
    #[error("flash accepted {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("flash write session is not open")]
    NotOpen,
    #[error("finalizing flash image failed: {0}")]
    Finalize(String),
}

/// Why an update session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error("wrote {written} bytes but {declared} were declared")]
    SizeMismatch { written: usize, declared: usize },
    #[error("no firmware data received")]
    NoData,
}

impl UpdateFailure {
    /// Error code reported alongside `HTTP_UPDATE_FAILED`.
    pub fn code(&self) -> i32 {
        match self {
            UpdateFailure::Transport(e) => e.code(),
            UpdateFailure::Flash(FlashError::Open { .. }) => -100,
            UpdateFailure::Flash(FlashError::ShortWrite { .. }) => -101,
            UpdateFailure::Flash(FlashError::NotOpen) => -102,
            UpdateFailure::Flash(FlashError::Finalize(_)) => -103,
            UpdateFailure::SizeMismatch { .. } => -104,
            UpdateFailure::NoData => -105,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("an update session is already in progress")]
    Busy,
    #[error("no update session is open")]
    NoSession,
}

/// Rejected settings change; nothing is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("hostname '{0}' must be 1 to 32 letters, digits or '-'")]
    InvalidHostname(String),
    #[error(transparent)]
    InvalidFirmwareUrl(#[from] TransportError),
}
