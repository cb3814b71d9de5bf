//! TLS record-size negotiation for a RAM-starved device.
//!
//! Full 16 KiB TLS buffers do not fit next to the web server and the DMX
//! engine, so before any real I/O the connector is asked which of a few small
//! maximum-fragment lengths the server accepts.

use embedded_io::{Read, Write};

use crate::error::TransportError;
use crate::http::{self, HttpResponse, LineReader};
use crate::orchestrator::{DownloadStream, FirmwareDownload};
use crate::release::UpdateTarget;
use crate::url::FirmwareUrl;
use crate::Yielder;

/// Probe order: 512, 1024, 2048, 4096.
pub const FRAGMENT_CANDIDATES: [usize; 4] = [512, 1024, 2048, 4096];
pub const MAX_FRAGMENT_SIZE: usize = 4096;
/// Used when the server accepted none of the candidates.
pub const FALLBACK_BUFFER_SIZE: usize = 1024;

/// First candidate the probe accepts. Candidates above `MAX_FRAGMENT_SIZE`
/// are never tried.
pub fn pick_fragment_size<F>(candidates: &[usize], mut probe: F) -> Option<usize>
where
    F: FnMut(usize) -> bool,
{
    candidates
        .iter()
        .copied()
        .filter(|&size| size <= MAX_FRAGMENT_SIZE)
        .find(|&size| probe(size))
}

/// Secure stream factory. The firmware backs this with esp-tls; tests script it.
pub trait SecureConnector {
    type Connection: Read + Write;

    /// Whether a session with `host` can run with `size`-byte fragments.
    /// Connectors that cannot request a fragment length from the server
    /// answer for reachability only and rely on `BoundedStream` for the size.
    fn probe_fragment_length(&mut self, host: &str, port: u16, size: usize) -> bool;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        buffer_size: usize,
    ) -> Result<Self::Connection, TransportError>;
}

pub struct NegotiatedSession<C> {
    pub connection: C,
    pub buffer_size: usize,
    /// No candidate was accepted; the fallback buffer may be too small.
    pub may_overflow: bool,
}

pub fn negotiate<S, Y>(
    connector: &mut S,
    yielder: &Y,
    host: &str,
    port: u16,
) -> Result<NegotiatedSession<S::Connection>, TransportError>
where
    S: SecureConnector,
    Y: Yielder + ?Sized,
{
    log::info!("Connecting to host {}, port {}", host, port);

    let accepted = pick_fragment_size(&FRAGMENT_CANDIDATES, |size| {
        let ok = connector.probe_fragment_length(host, port, size);
        log::info!("Probing for smaller TLS buffer: {} {}", size, if ok { "OK" } else { "Nope" });
        yielder.yield_now();
        ok
    });

    let (buffer_size, may_overflow) = match accepted {
        Some(size) => (size, false),
        None => {
            log::warn!("Fragment length negotiation failed, may get buffer overflow");
            (FALLBACK_BUFFER_SIZE, true)
        }
    };

    log::info!("Setting TLS buffer size to {}", buffer_size);
    let connection = connector.connect(host, port, buffer_size).map_err(|e| {
        log::error!("TLS connect to {} failed: {}", host, e);
        e
    })?;

    Ok(NegotiatedSession {
        connection,
        buffer_size,
        may_overflow,
    })
}

/// Negotiate, send a hand-built GET for `url` and read the whole response.
pub fn fetch_secure<S, Y>(
    connector: &mut S,
    yielder: &Y,
    url: &FirmwareUrl,
) -> Result<HttpResponse, TransportError>
where
    S: SecureConnector,
    Y: Yielder + ?Sized,
{
    let mut session = negotiate(connector, yielder, &url.host, url.port())?;
    http::send_get_request(&mut session.connection, &url.path(), &url.host_literal())?;
    let mut reader = LineReader::new(session.connection);
    http::read_response(&mut reader)
}

/// Stream whose single reads never exceed `limit` bytes.
pub struct BoundedStream<C> {
    inner: C,
    limit: usize,
}

impl<C> BoundedStream<C> {
    pub fn new(inner: C, limit: usize) -> Self {
        Self {
            inner,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<C: embedded_io::ErrorType> embedded_io::ErrorType for BoundedStream<C> {
    type Error = C::Error;
}

impl<C: Read> Read for BoundedStream<C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.limit);
        self.inner.read(&mut buf[..len])
    }
}

impl<C: Write> Write for BoundedStream<C> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush()
    }
}

/// Firmware download over a negotiated secure session. The GET is written by
/// hand and only the response head is consumed; the body is left in the
/// stream for the flash loop.
pub struct SecureDownload<S, Y> {
    connector: S,
    yielder: Y,
}

impl<S, Y> SecureDownload<S, Y>
where
    S: SecureConnector,
    Y: Yielder,
{
    pub fn new(connector: S, yielder: Y) -> Self {
        Self { connector, yielder }
    }

    pub fn connector(&self) -> &S {
        &self.connector
    }
}

impl<S, Y> FirmwareDownload for SecureDownload<S, Y>
where
    S: SecureConnector,
    Y: Yielder,
{
    type Body = S::Connection;

    fn open(&mut self, target: &UpdateTarget) -> Result<DownloadStream<S::Connection>, TransportError> {
        let url = FirmwareUrl::parse(&target.url)?;
        let mut session = negotiate(&mut self.connector, &self.yielder, &url.host, url.port())?;
        http::send_get_request(&mut session.connection, &url.path(), &url.host_literal())?;

        let mut reader = LineReader::new(session.connection);
        let head = http::read_response_head(&mut reader)?;
        log::info!("Firmware response: status {}, length {:?}", head.status, head.content_length);

        Ok(DownloadStream {
            status: head.status,
            content_length: head.content_length,
            body: reader.into_inner(),
        })
    }
}
