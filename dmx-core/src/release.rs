/// Release metadata document and the update decision derived from it
use serde::Serialize;

use crate::error::ParseError;
use crate::url::FirmwareUrl;
use crate::version::FirmwareVersion;

/// Name of the metadata document, relative to the configured base URL.
pub const RELEASE_METADATA_FILENAME: &str = "esp-dmx-release.txt";

pub const VERSION_MARKER: &str = "Latest-release: ";
pub const FILENAME_MARKER: &str = "Filename: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub version: FirmwareVersion,
    pub filename: String,
}

impl ReleaseMetadata {
    /// Parse the metadata body. Marker order is irrelevant; the last
    /// occurrence of each marker wins.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let version_at = body
            .rfind(VERSION_MARKER)
            .ok_or(ParseError::MissingMarker(VERSION_MARKER))?;
        let filename_at = body
            .rfind(FILENAME_MARKER)
            .ok_or(ParseError::MissingMarker(FILENAME_MARKER))?;

        let after_version = &body[version_at + VERSION_MARKER.len()..];
        let token = after_version
            .split(|c: char| c.is_ascii_whitespace())
            .next()
            .unwrap_or_default();
        let version = token.parse::<FirmwareVersion>()?;

        let after_filename = &body[filename_at + FILENAME_MARKER.len()..];
        let filename = after_filename
            .split('\n')
            .next()
            .unwrap_or_default()
            .trim();
        if filename.is_empty() {
            return Err(ParseError::EmptyFilename);
        }

        Ok(Self {
            version,
            filename: filename.to_string(),
        })
    }
}

/// Absolute URL of the firmware image to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateTarget {
    pub url: String,
}

impl UpdateTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDecision {
    pub available: bool,
    pub target: UpdateTarget,
    pub remote_version: FirmwareVersion,
}

impl UpdateDecision {
    /// Compare `metadata` against the running firmware; the image is expected
    /// next to the metadata document on the same host.
    pub fn evaluate(metadata: &ReleaseMetadata, base: &FirmwareUrl, local: FirmwareVersion) -> Self {
        Self {
            available: local.is_older_than(&metadata.version),
            target: UpdateTarget::new(base.sibling(&metadata.filename).to_string()),
            remote_version: metadata.version,
        }
    }
}
