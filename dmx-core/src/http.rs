//! Hand-rolled HTTP/1.1 plumbing for the secure path.
//!
//! The TLS transport only gives us a byte stream, so the request is written by
//! hand and the response is read line by line. Reads are byte-sized on purpose:
//! nothing past the header block is consumed, which leaves the body in the
//! stream for a caller that wants to stream it into flash.

use embedded_io::{Read, Write};

use crate::error::TransportError;

pub const USER_AGENT: &str = concat!("esp-dmx/", env!("CARGO_PKG_VERSION"));

/// Metadata documents are tiny; anything bigger is not ours.
pub const MAX_BODY_LEN: usize = 4096;

/// Longest header line kept; longer header lines are truncated, not rejected.
const MAX_LINE_LEN: usize = 512;

/// `GET <path> HTTP/1.1` with `Host` and `User-Agent`, nothing else.
pub fn build_get_request(path: &str, host: &str, user_agent: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n\r\n",
        path, host, user_agent
    )
}

pub fn send_get_request<W: Write>(
    conn: &mut W,
    path: &str,
    host: &str,
) -> Result<(), TransportError> {
    let request = build_get_request(path, host, USER_AGENT);
    log::debug!("Sending request: {}", request.trim_end());
    conn.write_all(request.as_bytes()).map_err(io_error)?;
    conn.flush().map_err(io_error)?;
    Ok(())
}

/// Status code from a status line such as `HTTP/1.1 200 OK`.
///
/// Takes the three characters after the first space, so `HTTP/1.0 404` and
/// `HTTP/1.1 200OK` both work.
pub fn parse_status_line(line: &str) -> Option<u16> {
    if !line.starts_with("HTTP") {
        return None;
    }
    let after_space = &line[line.find(' ')? + 1..];
    after_space.get(..3)?.parse().ok()
}

/// Reads `\n`-terminated lines from a byte stream one byte at a time.
pub struct LineReader<R> {
    inner: R,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next header line including its terminator, or `None` at end of stream.
    /// Bytes past `MAX_LINE_LEN` are dropped; only headers are read this way.
    pub fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.inner.read(&mut byte).map_err(io_error)?;
            if n == 0 {
                break;
            }
            if line.len() < MAX_LINE_LEN || byte[0] == b'\n' {
                line.push(byte[0]);
            }
            if byte[0] == b'\n' {
                break;
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Append the next line, terminator included, to `out` without dropping
    /// anything. Stops after `budget` bytes even mid-line; returns the count.
    pub fn read_line_into(&mut self, out: &mut Vec<u8>, budget: usize) -> Result<usize, TransportError> {
        let mut byte = [0u8; 1];
        let mut taken = 0;
        while taken < budget {
            let n = self.inner.read(&mut byte).map_err(io_error)?;
            if n == 0 {
                break;
            }
            out.push(byte[0]);
            taken += 1;
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(taken)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: Option<usize>,
}

/// Consume the status line and headers, stopping at the blank line.
///
/// The first line starting with `HTTP` sets the status. A stream that ends
/// before any status line is a transport error.
pub fn read_response_head<R: Read>(reader: &mut LineReader<R>) -> Result<ResponseHead, TransportError> {
    let mut status = None;
    let mut content_length = None;

    while let Some(line) = reader.read_line()? {
        let line = line.trim_end_matches('\n');
        log::trace!("Header: {}", line);
        if line == "\r" || line.is_empty() {
            break;
        }
        if status.is_none() {
            if let Some(code) = parse_status_line(line) {
                log::debug!("Status code: {}", code);
                status = Some(code);
                continue;
            }
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
        }
    }

    Ok(ResponseHead {
        status: status.ok_or(TransportError::NoStatus)?,
        content_length,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Read a whole (small) response: head, then every remaining line in order.
///
/// With a `Content-Length` exactly that many bytes are read, so a keep-alive
/// server is never waited on. Without one the body runs to end of stream.
pub fn read_response<R: Read>(reader: &mut LineReader<R>) -> Result<HttpResponse, TransportError> {
    let head = read_response_head(reader)?;
    if head.content_length.map_or(false, |len| len > MAX_BODY_LEN) {
        return Err(TransportError::BodyTooLarge(MAX_BODY_LEN));
    }
    // One byte over the cap is enough to know the body is too large
    let limit = head.content_length.unwrap_or(MAX_BODY_LEN + 1);

    let mut body = Vec::new();
    while body.len() < limit {
        let budget = limit - body.len();
        if reader.read_line_into(&mut body, budget)? == 0 {
            break;
        }
    }
    if body.len() > MAX_BODY_LEN {
        return Err(TransportError::BodyTooLarge(MAX_BODY_LEN));
    }

    Ok(HttpResponse {
        status: head.status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

pub(crate) fn io_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Io(format!("{:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_exact_wire_format() {
        assert_eq!(
            build_get_request("/fw/esp-dmx-release.txt", "example.org", "esp-dmx/2.5.0"),
            "GET /fw/esp-dmx-release.txt HTTP/1.1\r\nHost: example.org\r\nUser-Agent: esp-dmx/2.5.0\r\n\r\n"
        );
    }

    #[test]
    fn send_writes_request_to_connection() {
        let mut sink: Vec<u8> = Vec::new();
        send_get_request(&mut sink, "/a.txt", "h").unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.starts_with("GET /a.txt HTTP/1.1\r\nHost: h\r\nUser-Agent: esp-dmx/"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn status_line_variants() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK\r"), Some(200));
        assert_eq!(parse_status_line("HTTP/1.0 404 Not Found"), Some(404));
        assert_eq!(parse_status_line("HTTP/1.1 301"), Some(301));
        assert_eq!(parse_status_line("HTTP/1.1 20"), None);
        assert_eq!(parse_status_line("Server: HTTP 200"), None);
        assert_eq!(parse_status_line("HTTP/1.1"), None);
    }

    #[test]
    fn reads_lines_with_terminators() {
        let mut reader = LineReader::new(&b"one\r\ntwo\nthree"[..]);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("one\r\n"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("two\n"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("three"));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn head_stops_at_blank_line_and_leaves_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nServer: x\r\n\r\nBODY";
        let mut reader = LineReader::new(&raw[..]);
        let head = read_response_head(&mut reader).unwrap();
        assert_eq!(head, ResponseHead { status: 200, content_length: Some(4) });
        let mut rest = reader.into_inner();
        let mut buf = [0u8; 8];
        let n = rest.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"BODY");
    }

    #[test]
    fn full_response_keeps_body_lines_in_order() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\nLatest-release: 2.5\nFilename: esp-dmx-2.5.bin\n";
        let response = read_response(&mut LineReader::new(&raw[..])).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Latest-release: 2.5\nFilename: esp-dmx-2.5.bin\n");
    }

    #[test]
    fn missing_status_line_is_transport_error() {
        let raw = b"garbage\r\n\r\n";
        assert_eq!(
            read_response(&mut LineReader::new(&raw[..])),
            Err(TransportError::NoStatus)
        );
    }

    #[test]
    fn oversized_declared_body_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 999999\r\n\r\n";
        assert_eq!(
            read_response(&mut LineReader::new(&raw[..])),
            Err(TransportError::BodyTooLarge(MAX_BODY_LEN))
        );
    }

    #[test]
    fn long_body_line_is_kept_whole() {
        let body = format!("{}\nLatest-release: 2.6\nFilename: esp-dmx-2.6.bin\n", "#".repeat(600));
        let raw = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
        let response = read_response(&mut LineReader::new(raw.as_bytes())).unwrap();
        assert_eq!(response.body, body);
    }

    #[test]
    fn body_stops_at_content_length() {
        // Trailing bytes stand in for a keep-alive server's next response
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nab\ncd\nNEXT";
        let mut reader = LineReader::new(&raw[..]);
        let response = read_response(&mut reader).unwrap();
        assert_eq!(response.body, "ab\ncd\n");
        let mut rest = reader.into_inner();
        let mut buf = [0u8; 8];
        let n = rest.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"NEXT");
    }

    #[test]
    fn multibyte_text_survives_long_lines() {
        let body = format!("{}\n", "\u{e9}".repeat(400));
        let raw = format!("HTTP/1.1 200 OK\r\n\r\n{}", body);
        let response = read_response(&mut LineReader::new(raw.as_bytes())).unwrap();
        assert_eq!(response.body, body);
    }

    #[test]
    fn undeclared_body_over_cap_is_rejected() {
        let raw = format!("HTTP/1.1 200 OK\r\n\r\n{}", "x".repeat(MAX_BODY_LEN + 10));
        assert_eq!(
            read_response(&mut LineReader::new(raw.as_bytes())),
            Err(TransportError::BodyTooLarge(MAX_BODY_LEN))
        );
    }
}
