//! Update orchestration: URL download or browser upload into flash, then restart
//!
//! Update flow:
//! 1. Operator runs a check (`run_check`), the decision is kept for the page
//! 2. Operator starts an update from the URL or uploads a file
//! 3. The image is streamed into the flash sink
//! 4. The result page is sent
//! 5. The device restarts, whatever the result

use core::fmt::Display;
use core::time::Duration;

use embedded_io::Read;
use serde::Serialize;

use crate::checker::{HttpFetch, UpdateCheckState, VersionChecker};
use crate::error::{FlashError, SessionError, TransportError, UpdateFailure};
use crate::http::io_error;
use crate::release::{UpdateDecision, UpdateTarget};
use crate::session::{
    max_sketch_space, FlashSink, Phase, SessionResult, UpdateSession, UpdateSource, RESERVED_OFFSET,
};
use crate::status::{StatusSignal, UpdateSignal};
use crate::transport::SecureConnector;
use crate::version::FirmwareVersion;
use crate::Yielder;

/// Pause between sending the result page and restarting.
pub const RESTART_DELAY: Duration = Duration::from_millis(1000);

const DOWNLOAD_CHUNK_SIZE: usize = 1024;

pub struct DownloadStream<B> {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body: B,
}

/// Opens a streaming GET for a firmware image.
pub trait FirmwareDownload {
    type Body: Read;

    fn open(&mut self, target: &UpdateTarget) -> Result<DownloadStream<Self::Body>, TransportError>;
}

/// Waits `delay` and resets the device. On hardware this never returns.
pub trait Restarter {
    fn restart(&mut self, delay: Duration);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    Failed(UpdateFailure),
    NoUpdates,
    Ok,
}

impl UpdateResult {
    /// Literal result code shown to the operator.
    pub fn code(&self) -> &'static str {
        match self {
            UpdateResult::Failed(_) => "HTTP_UPDATE_FAILED",
            UpdateResult::NoUpdates => "HTTP_UPDATE_NO_UPDATES",
            UpdateResult::Ok => "HTTP_UPDATE_OK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub source: UpdateSource,
    pub result: UpdateResult,
}

impl UpdateOutcome {
    fn from_session(session: &UpdateSession) -> Self {
        let result = match session.result() {
            SessionResult::Success => UpdateResult::Ok,
            SessionResult::Failed(failure) => UpdateResult::Failed(failure.clone()),
            SessionResult::Pending => UpdateResult::Failed(
                session.recorded_error().cloned().unwrap_or(UpdateFailure::NoData),
            ),
        };
        Self { source: session.source, result }
    }

    pub fn is_success(&self) -> bool {
        self.result == UpdateResult::Ok
    }

    /// One-line result for the page and the log.
    pub fn describe(&self) -> String {
        match (self.source, &self.result) {
            (UpdateSource::UploadedFile, UpdateResult::Ok) => {
                "Upload from file complete - rebooting".to_string()
            }
            (UpdateSource::UploadedFile, UpdateResult::Failed(failure)) => format!("Error: {}", failure),
            (_, UpdateResult::Failed(failure)) => format!(
                "{} Error: {} Text: {}",
                self.result.code(),
                failure.code(),
                failure
            ),
            (_, result) => result.code().to_string(),
        }
    }
}

/// Snapshot for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub source: UpdateSource,
    pub phase: Phase,
    pub bytes_written: usize,
    pub progress: Option<u8>,
}

pub struct UpdateOrchestrator<F, S, R, Y> {
    flash: F,
    status: S,
    restarter: R,
    yielder: Y,
    session: Option<UpdateSession>,
    check: UpdateCheckState,
}

impl<F, S, R, Y> UpdateOrchestrator<F, S, R, Y>
where
    F: FlashSink,
    S: StatusSignal,
    R: Restarter,
    Y: Yielder,
{
    pub fn new(flash: F, status: S, restarter: R, yielder: Y) -> Self {
        Self {
            flash,
            status,
            restarter,
            yielder,
            session: None,
            check: UpdateCheckState::default(),
        }
    }

    pub fn check_state(&self) -> &UpdateCheckState {
        &self.check
    }

    pub fn session(&self) -> Option<&UpdateSession> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(|s| SessionSnapshot {
            source: s.source,
            phase: s.phase(),
            bytes_written: s.bytes_written,
            progress: s.progress_percent(),
        })
    }

    pub fn status_mut(&mut self) -> &mut S {
        &mut self.status
    }

    /// Operator-triggered check. `base_url` is read once, here.
    pub fn run_check<P, C, Z>(
        &mut self,
        checker: &mut VersionChecker<P, C, Z>,
        base_url: &str,
        local: FirmwareVersion,
    ) -> &UpdateCheckState
    where
        P: HttpFetch,
        C: SecureConnector,
        Z: Yielder,
    {
        UpdateSignal::CheckStarted.apply(&mut self.status);
        let result = checker.check_for_update(base_url, local);
        UpdateSignal::Idle.apply(&mut self.status);
        self.check.apply(base_url, result);
        &self.check
    }

    /// Claim the flash resource for a new session; at most one exists.
    fn open_session(&mut self, source: UpdateSource, first_phase: Phase) -> Result<(), SessionError> {
        if let Some(existing) = &self.session {
            log::warn!(
                "Rejecting {:?} update: {:?} session is {:?}",
                source,
                existing.source,
                existing.phase()
            );
            return Err(SessionError::Busy);
        }
        self.session.insert(UpdateSession::new(source)).advance(first_phase);
        Ok(())
    }

    /// Download `decision`'s target and write it to flash. Auto-reboot is
    /// not done here; the caller shows the outcome and then calls `conclude`.
    pub fn update_from_url<D: FirmwareDownload>(
        &mut self,
        download: &mut D,
        decision: &UpdateDecision,
    ) -> Result<UpdateOutcome, SessionError> {
        self.open_session(UpdateSource::RemoteUrl, Phase::Checking)?;

        if !decision.available {
            log::info!("HTTP_UPDATE_NO_UPDATES: {} is not newer", decision.remote_version);
            self.session = None;
            return Ok(UpdateOutcome {
                source: UpdateSource::RemoteUrl,
                result: UpdateResult::NoUpdates,
            });
        }

        log::info!("Updating from URL: {}", decision.target.url);
        UpdateSignal::WriteStarted.apply(&mut self.status);
        let outcome = match self.stream_into_flash(download, &decision.target) {
            Ok(Some(())) | Err(_) => self.session_outcome(),
            Ok(None) => {
                self.session = None;
                UpdateOutcome {
                    source: UpdateSource::RemoteUrl,
                    result: UpdateResult::NoUpdates,
                }
            }
        };
        log::info!("{}", outcome.describe());
        Ok(outcome)
    }

    fn session_outcome(&self) -> UpdateOutcome {
        self.session
            .as_ref()
            .map(UpdateOutcome::from_session)
            .unwrap_or(UpdateOutcome {
                source: UpdateSource::RemoteUrl,
                result: UpdateResult::Failed(UpdateFailure::NoData),
            })
    }

    /// `Ok(None)` when the server says there is nothing new (304).
    fn stream_into_flash<D: FirmwareDownload>(
        &mut self,
        download: &mut D,
        target: &UpdateTarget,
    ) -> Result<Option<()>, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        session.advance(Phase::Downloading);

        let mut stream = match download.open(target) {
            Ok(stream) => stream,
            Err(e) => {
                session.fail(e.into());
                return Ok(Some(()));
            }
        };
        match stream.status {
            200 => {}
            304 => return Ok(None),
            other => {
                session.fail(TransportError::Status(other).into());
                return Ok(Some(()));
            }
        }

        session.expected_size = stream.content_length;
        let open_size = stream
            .content_length
            .unwrap_or_else(|| max_sketch_space(self.flash.free_space(), RESERVED_OFFSET));
        if let Err(e) = self.flash.begin(open_size) {
            session.fail(e.into());
            return Ok(Some(()));
        }
        session.flash_open = true;

        let mut buf = [0u8; DOWNLOAD_CHUNK_SIZE];
        loop {
            let n = match stream.body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.flash.abort();
                    session.flash_open = false;
                    session.fail(io_error(e).into());
                    return Ok(Some(()));
                }
            };
            let written = self.flash.write(&buf[..n]);
            session.bytes_written += written;
            if written != n {
                self.flash.abort();
                session.flash_open = false;
                session.fail(FlashError::ShortWrite { expected: n, written }.into());
                return Ok(Some(()));
            }
            self.yielder.yield_now();
        }

        session.advance(Phase::Verifying);
        let written = session.bytes_written;
        let failure = match stream.content_length {
            _ if written == 0 => Some(UpdateFailure::NoData),
            Some(declared) if declared != written => Some(UpdateFailure::SizeMismatch { written, declared }),
            _ => None,
        };
        session.flash_open = false;
        if let Some(failure) = failure {
            self.flash.abort();
            session.fail(failure);
            return Ok(Some(()));
        }

        match self.flash.finish(written) {
            Ok(()) => session.succeed(),
            Err(e) => session.fail(e.into()),
        }
        Ok(Some(()))
    }

    /// Upload `Start`: open flash sized to the whole usable region. A refused
    /// open is recorded and reported at the end, not raised.
    pub fn upload_start(&mut self, filename: &str) -> Result<(), SessionError> {
        self.open_session(UpdateSource::UploadedFile, Phase::Writing)?;
        UpdateSignal::WriteStarted.apply(&mut self.status);

        let max = max_sketch_space(self.flash.free_space(), RESERVED_OFFSET);
        log::info!("Upload start, filename: {}, space available: {}", filename, max);
        let opened = self.flash.begin(max);
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        match opened {
            Ok(()) => session.flash_open = true,
            Err(e) => session.record_error(e.into()),
        }
        Ok(())
    }

    /// Upload `Write`: short writes are recorded and the rest of the upload is
    /// still drained, since the transport cannot abort mid-body.
    pub fn upload_write(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        let session = self
            .session
            .as_mut()
            .filter(|s| s.source == UpdateSource::UploadedFile && s.phase() == Phase::Writing)
            .ok_or(SessionError::NoSession)?;

        let written = if session.flash_open { self.flash.write(chunk) } else { 0 };
        session.bytes_written += written;
        if written != chunk.len() {
            session.record_error(
                FlashError::ShortWrite {
                    expected: chunk.len(),
                    written,
                }
                .into(),
            );
        }
        self.yielder.yield_now();
        Ok(())
    }

    /// Upload `End`: finalize with the received size, then compare against
    /// what the transport says it delivered.
    pub fn upload_end(&mut self, total_size: usize) -> Result<(), SessionError> {
        let session = self
            .session
            .as_mut()
            .filter(|s| s.source == UpdateSource::UploadedFile && s.phase() == Phase::Writing)
            .ok_or(SessionError::NoSession)?;
        session.advance(Phase::Verifying);
        session.expected_size = Some(total_size);

        if session.flash_open {
            session.flash_open = false;
            if let Err(e) = self.flash.finish(session.bytes_written) {
                session.record_error(e.into());
            }
        }

        // Nothing reached flash: report the recorded cause
        let written = session.bytes_written;
        match session.recorded_error().cloned() {
            Some(cause) if written == 0 => session.fail(cause),
            _ if written != total_size => session.fail(UpdateFailure::SizeMismatch {
                written,
                declared: total_size,
            }),
            _ if written == 0 => session.fail(UpdateFailure::NoData),
            _ => session.conclude(),
        }
        log::info!("Upload end, totalSize={}, result {:?}", total_size, session.result());
        Ok(())
    }

    /// Outcome of the upload session, or a failure when nothing was uploaded.
    pub fn upload_outcome(&self) -> UpdateOutcome {
        match self.session.as_ref() {
            Some(session) if session.source == UpdateSource::UploadedFile => {
                UpdateOutcome::from_session(session)
            }
            _ => UpdateOutcome {
                source: UpdateSource::UploadedFile,
                result: UpdateResult::Failed(UpdateFailure::NoData),
            },
        }
    }

    /// Terminal step for both paths: signal, respond, wait, restart.
    ///
    /// The restart is unconditional. There is no rollback, so a failed write
    /// leaves an undefined image and a reset is the only clean state.
    pub fn conclude<E, H>(&mut self, outcome: &UpdateOutcome, respond: H)
    where
        E: Display,
        H: FnOnce(&UpdateOutcome) -> Result<(), E>,
    {
        let signal = match outcome.result {
            UpdateResult::Failed(_) => UpdateSignal::Failed,
            _ => UpdateSignal::SucceededRestarting,
        };
        signal.apply(&mut self.status);

        if let Err(e) = respond(outcome) {
            log::error!("Failed to send update result page: {}", e);
        }

        if let Some(session) = self.session.take() {
            if session.flash_open {
                log::warn!("Closing flash session left open in {:?}", session.phase());
                self.flash.abort();
            }
        }

        log::info!("Restarting in {} ms", RESTART_DELAY.as_millis());
        self.restarter.restart(RESTART_DELAY);
    }
}
