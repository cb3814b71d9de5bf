//! Release check against the configured firmware host

use serde::Serialize;

use crate::error::{CheckError, TransportError};
use crate::http::HttpResponse;
use crate::release::{ReleaseMetadata, UpdateDecision, RELEASE_METADATA_FILENAME};
use crate::transport::{self, SecureConnector};
use crate::url::{normalize_base_url, FirmwareUrl};
use crate::version::FirmwareVersion;
use crate::Yielder;

/// Plain (non-TLS) HTTP GET returning the status and the whole body.
pub trait HttpFetch {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError>;
}

pub struct VersionChecker<P, S, Y> {
    plain: P,
    secure: S,
    yielder: Y,
}

impl<P, S, Y> VersionChecker<P, S, Y>
where
    P: HttpFetch,
    S: SecureConnector,
    Y: Yielder,
{
    pub fn new(plain: P, secure: S, yielder: Y) -> Self {
        Self { plain, secure, yielder }
    }

    pub fn check_for_update(
        &mut self,
        base_url: &str,
        local: FirmwareVersion,
    ) -> Result<UpdateDecision, CheckError> {
        let version_url = format!("{}{}", normalize_base_url(base_url), RELEASE_METADATA_FILENAME);
        log::info!("Checking for new version: URL={}", version_url);

        let url = FirmwareUrl::parse(&version_url)?;
        let response = if url.is_secure() {
            transport::fetch_secure(&mut self.secure, &self.yielder, &url)?
        } else {
            self.plain.get(&version_url)?
        };

        if response.status != 200 {
            log::warn!("Error {} retrieving {}", response.status, version_url);
            return Err(TransportError::Status(response.status).into());
        }

        let metadata = ReleaseMetadata::parse(&response.body)?;
        log::info!("Current firmware version: {}", local);
        log::info!("Firmware on server: {}", metadata.version);

        let decision = UpdateDecision::evaluate(&metadata, &url, local);
        if decision.available {
            log::info!("New firmware at {}", decision.target.url);
        }
        Ok(decision)
    }

    pub fn plain_mut(&mut self) -> &mut P {
        &mut self.plain
    }

    pub fn secure_mut(&mut self) -> &mut S {
        &mut self.secure
    }
}

/// What the update page shows: the last good decision and a status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCheckState {
    pub decision: Option<UpdateDecision>,
    pub status_text: String,
}

impl UpdateCheckState {
    /// Fold a check result in. Errors only change the status text; the
    /// previous decision stays as it was.
    pub fn apply(&mut self, base_url: &str, result: Result<UpdateDecision, CheckError>) {
        match result {
            Ok(decision) => {
                self.status_text = if decision.available {
                    format!(
                        "new firmware {} available at {}",
                        decision.remote_version, decision.target.url
                    )
                } else {
                    format!("This is the latest version available at {}", base_url)
                };
                self.decision = Some(decision);
            }
            Err(e) => {
                log::warn!("Update check failed: {}", e);
                self.status_text = format!("Error {} checking for new firmware at {}", e, base_url);
            }
        }
    }

    /// Target of a pending newer release, if the last good check found one.
    pub fn available_target(&self) -> Option<&UpdateDecision> {
        self.decision.as_ref().filter(|d| d.available)
    }
}
