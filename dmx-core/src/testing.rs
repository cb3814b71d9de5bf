// Fakes for the traits the firmware implements with ESP-IDF.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use embedded_io::{ErrorType, Read, Write};

use crate::checker::HttpFetch;
use crate::error::{FlashError, TransportError};
use crate::http::HttpResponse;
use crate::orchestrator::{DownloadStream, FirmwareDownload, Restarter};
use crate::release::UpdateTarget;
use crate::session::FlashSink;
use crate::status::{LedColor, StatusSignal};
use crate::transport::SecureConnector;

pub fn no_yield() {}

/// In-memory byte stream that records what was written to it.
pub struct FakeConnection {
    input: Vec<u8>,
    pos: usize,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl ErrorType for FakeConnection {
    type Error = core::convert::Infallible;
}

impl Read for FakeConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.input.len() - self.pos);
        buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for FakeConnection {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.sent.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct ScriptedConnector {
    /// Smallest accepted fragment size; `None` rejects every probe.
    accept_from: Option<usize>,
    response: Vec<u8>,
    sent: Rc<RefCell<Vec<u8>>>,
    pub probes: Vec<usize>,
    pub connected_with: Option<usize>,
    pub connect_error: Option<i32>,
}

impl ScriptedConnector {
    pub fn accepting(accept_from: Option<usize>, response: &[u8]) -> Self {
        Self {
            accept_from,
            response: response.to_vec(),
            sent: Rc::default(),
            probes: Vec::new(),
            connected_with: None,
            connect_error: None,
        }
    }

    pub fn sent(&self) -> Vec<u8> {
        self.sent.borrow().clone()
    }
}

impl SecureConnector for ScriptedConnector {
    type Connection = FakeConnection;

    fn probe_fragment_length(&mut self, _host: &str, _port: u16, size: usize) -> bool {
        self.probes.push(size);
        self.accept_from.is_some_and(|min| size >= min)
    }

    fn connect(&mut self, host: &str, port: u16, buffer_size: usize) -> Result<FakeConnection, TransportError> {
        if let Some(code) = self.connect_error {
            return Err(TransportError::Connect { host: host.to_string(), port, code });
        }
        self.connected_with = Some(buffer_size);
        Ok(FakeConnection {
            input: self.response.clone(),
            pos: 0,
            sent: self.sent.clone(),
        })
    }
}

/// Plain HTTP client returning a canned result and remembering the URLs asked for.
pub struct CannedFetch {
    pub result: Result<HttpResponse, TransportError>,
    pub requested: Vec<String>,
}

impl CannedFetch {
    pub fn ok(body: &str) -> Self {
        Self {
            result: Ok(HttpResponse { status: 200, body: body.to_string() }),
            requested: Vec::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            result: Ok(HttpResponse { status, body: String::new() }),
            requested: Vec::new(),
        }
    }

    pub fn failing(err: TransportError) -> Self {
        Self { result: Err(err), requested: Vec::new() }
    }
}

impl HttpFetch for CannedFetch {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        self.requested.push(url.to_string());
        self.result.clone()
    }
}

/// Flash partition in RAM. `accept_per_write` caps how much each write takes.
#[derive(Default)]
pub struct MemoryFlash {
    pub free: usize,
    pub open_with: Option<usize>,
    pub image: Vec<u8>,
    pub finished_at: Option<usize>,
    pub aborted: bool,
    pub fail_open: bool,
    pub fail_finish: bool,
    pub accept_per_write: Option<usize>,
}

impl MemoryFlash {
    pub fn with_free_space(free: usize) -> Self {
        Self { free, ..Default::default() }
    }
}

impl FlashSink for MemoryFlash {
    fn free_space(&self) -> usize {
        self.free
    }

    fn begin(&mut self, max_size: usize) -> Result<(), FlashError> {
        if self.fail_open || max_size == 0 {
            return Err(FlashError::Open { requested: max_size, reason: "refused".into() });
        }
        self.open_with = Some(max_size);
        self.image.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let Some(limit) = self.open_with else { return 0 };
        let room = limit.saturating_sub(self.image.len());
        let n = data.len().min(room).min(self.accept_per_write.unwrap_or(usize::MAX));
        self.image.extend_from_slice(&data[..n]);
        n
    }

    fn finish(&mut self, image_size: usize) -> Result<(), FlashError> {
        if self.open_with.take().is_none() {
            return Err(FlashError::NotOpen);
        }
        if self.fail_finish {
            return Err(FlashError::Finalize("bad image".into()));
        }
        self.finished_at = Some(image_size);
        Ok(())
    }

    fn abort(&mut self) {
        self.open_with = None;
        self.aborted = true;
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    pub states: Vec<(LedColor, u32)>,
}

impl StatusSignal for RecordingStatus {
    fn set_state(&mut self, color: LedColor, blink_interval_ms: u32) {
        self.states.push((color, blink_interval_ms));
    }
}

#[derive(Default)]
pub struct RecordingRestarter {
    pub restarts: Vec<Duration>,
}

impl Restarter for RecordingRestarter {
    fn restart(&mut self, delay: Duration) {
        self.restarts.push(delay);
    }
}

/// Firmware server serving one canned download.
pub struct CannedDownload {
    pub status: u16,
    pub content_length: Option<usize>,
    pub chunks: VecDeque<Vec<u8>>,
    pub fail_open: Option<TransportError>,
}

impl CannedDownload {
    pub fn serving(image: &[u8], chunk: usize) -> Self {
        Self {
            status: 200,
            content_length: Some(image.len()),
            chunks: image.chunks(chunk).map(<[u8]>::to_vec).collect(),
            fail_open: None,
        }
    }
}

pub struct ChunkedBody {
    chunks: VecDeque<Vec<u8>>,
}

impl ErrorType for ChunkedBody {
    type Error = core::convert::Infallible;
}

impl Read for ChunkedBody {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some(mut chunk) = self.chunks.pop_front() else { return Ok(0) };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl FirmwareDownload for CannedDownload {
    type Body = ChunkedBody;

    fn open(&mut self, _target: &UpdateTarget) -> Result<DownloadStream<ChunkedBody>, TransportError> {
        if let Some(err) = self.fail_open.take() {
            return Err(err);
        }
        Ok(DownloadStream {
            status: self.status,
            content_length: self.content_length,
            body: ChunkedBody { chunks: core::mem::take(&mut self.chunks) },
        })
    }
}
