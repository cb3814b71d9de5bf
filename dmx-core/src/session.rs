//! One firmware update attempt and the flash resource it owns
//!
//! There is no A/B rollback: once `FlashSink::begin` has succeeded, a later
//! failure leaves the update region in an undefined state and the device
//! restarts anyway.

use serde::Serialize;

use crate::error::{FlashError, UpdateFailure};

/// Kept free at the end of the sketch space.
pub const RESERVED_OFFSET: usize = 0x1000;
pub const FLASH_SECTOR_SIZE: usize = 0x1000;

/// Largest image the upload path may write: free space minus the reserved
/// offset, rounded down to a whole sector.
pub fn max_sketch_space(free_sketch_space: usize, reserved_offset: usize) -> usize {
    free_sketch_space.saturating_sub(reserved_offset) & !(FLASH_SECTOR_SIZE - 1)
}

/// Program-memory write target. Only one session may hold it at a time.
pub trait FlashSink {
    /// Bytes available for a new image.
    fn free_space(&self) -> usize;

    /// Open a write session able to take up to `max_size` bytes.
    fn begin(&mut self, max_size: usize) -> Result<(), FlashError>;

    /// Append `data`; returns how many bytes were actually written.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Close the session, treating the first `image_size` bytes as the image.
    fn finish(&mut self, image_size: usize) -> Result<(), FlashError>;

    /// Close the session without activating anything.
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateSource {
    RemoteUrl,
    UploadedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Pending,
    Checking,
    Downloading,
    Writing,
    Verifying,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// `Pending -> (Checking) -> Downloading|Writing -> Verifying -> {Succeeded, Failed}`,
    /// with `Failed` reachable from every non-terminal phase.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Checking | Downloading | Writing) => true,
            (Checking, Downloading | Writing) => true,
            (Downloading | Writing, Verifying) => true,
            (Verifying, Succeeded) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResult {
    Pending,
    Success,
    Failed(UpdateFailure),
}

#[derive(Debug, Clone)]
pub struct UpdateSession {
    pub source: UpdateSource,
    phase: Phase,
    pub bytes_written: usize,
    pub expected_size: Option<usize>,
    /// The flash sink accepted `begin` and has not been closed yet.
    pub flash_open: bool,
    first_error: Option<UpdateFailure>,
    result: SessionResult,
}

impl UpdateSession {
    pub fn new(source: UpdateSource) -> Self {
        Self {
            source,
            phase: Phase::Pending,
            bytes_written: 0,
            expected_size: None,
            flash_open: false,
            first_error: None,
            result: SessionResult::Pending,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> &SessionResult {
        &self.result
    }

    pub fn advance(&mut self, next: Phase) {
        if !self.phase.can_advance_to(next) {
            log::warn!("Ignoring update phase change {:?} -> {:?}", self.phase, next);
            return;
        }
        log::debug!("Update phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Remember an error without ending the session. The first one sticks.
    pub fn record_error(&mut self, failure: UpdateFailure) {
        log::error!("Update error: {}", failure);
        if self.first_error.is_none() {
            self.first_error = Some(failure);
        }
    }

    pub fn recorded_error(&self) -> Option<&UpdateFailure> {
        self.first_error.as_ref()
    }

    pub fn succeed(&mut self) {
        self.advance(Phase::Succeeded);
        self.result = SessionResult::Success;
    }

    pub fn fail(&mut self, failure: UpdateFailure) {
        self.advance(Phase::Failed);
        self.result = SessionResult::Failed(failure);
    }

    /// Resolve the session from whatever was recorded so far.
    pub fn conclude(&mut self) {
        match self.first_error.clone() {
            Some(failure) => self.fail(failure),
            None => self.succeed(),
        }
    }

    pub fn progress_percent(&self) -> Option<u8> {
        let expected = self.expected_size.filter(|&n| n > 0)?;
        Some(((self.bytes_written.min(expected) * 100) / expected) as u8)
    }
}
