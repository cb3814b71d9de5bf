/// Minimal URL handling for the firmware host.
///
/// Only what the update path needs: scheme, host, port and the directory the
/// release files live in. No query strings, no userinfo.
use core::fmt;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareUrl {
    pub scheme: Scheme,
    pub host: String,
    /// Only set when the URL spelled it out.
    pub explicit_port: Option<u16>,
    /// Path up to and including the last `/`.
    pub dir: String,
    /// Whatever followed the last `/`, possibly empty.
    pub file: String,
}

impl FirmwareUrl {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidUrl(url.to_string());

        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(invalid());
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        // IPv6 literals are bracketed: `[fe80::1]:8080`
        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
                match after {
                    "" => (host, None),
                    _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
                }
            }
            None => match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            },
        };
        let explicit_port = port
            .map(|p| p.parse::<u16>().map_err(|_| invalid()))
            .transpose()?;
        if host.is_empty() {
            return Err(invalid());
        }

        // `path` always starts with '/', so there is a last slash
        let split = path.rfind('/').map_or(0, |i| i + 1);
        Ok(Self {
            scheme,
            host: host.to_string(),
            explicit_port,
            dir: path[..split].to_string(),
            file: path[split..].to_string(),
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Host as written in a URL or `Host` header; IPv6 literals get brackets.
    pub fn host_literal(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    pub fn port(&self) -> u16 {
        self.explicit_port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Request target for the request line, e.g. `/fw/esp-dmx-release.txt`.
    pub fn path(&self) -> String {
        format!("{}{}", self.dir, self.file)
    }

    /// Same host and directory, different file.
    pub fn sibling(&self, file: &str) -> FirmwareUrl {
        FirmwareUrl {
            file: file.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for FirmwareUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host_literal())?;
        if let Some(port) = self.explicit_port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}{}", self.dir, self.file)
    }
}

/// Base URLs are used as directories; make sure concatenation lands inside them.
pub fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}
