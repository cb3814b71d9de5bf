/// Device configuration record. Load/save lives in the firmware; the update
/// core reads `fw_url` and validates operator edits.
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::url::{normalize_base_url, FirmwareUrl};

const MAX_HOSTNAME_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub hostname: String,
    /// Base URL the release metadata and images are fetched from.
    #[serde(rename = "fwURL")]
    pub fw_url: String,

    // Lighting settings, shown on the status page only
    pub universe: u16,
    pub channels: u16,
    pub delay: u16,
    #[serde(rename = "holdsecs")]
    pub hold_secs: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: "ESP-DMX".to_string(),
            fw_url: "http://192.168.4.1/".to_string(),
            universe: 0,
            channels: 512,
            delay: 30,
            hold_secs: 30,
        }
    }
}

impl Config {
    /// First-boot defaults: hostname from the MAC, firmware host on the gateway.
    pub fn defaults_for(mac: [u8; 6], gateway: Ipv4Addr) -> Self {
        Self {
            hostname: format!("ESP-DMX-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]),
            fw_url: format!("http://{}/", gateway),
            ..Self::default()
        }
    }

    pub fn firmware_base_url(&self) -> String {
        normalize_base_url(&self.fw_url)
    }

    /// Apply an operator edit. Every field is checked before any is changed.
    pub fn apply_update(&mut self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let hostname = update.hostname.map(|h| h.trim().to_string());
        if let Some(hostname) = &hostname {
            let valid = !hostname.is_empty()
                && hostname.len() <= MAX_HOSTNAME_LEN
                && hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
            if !valid {
                return Err(ConfigError::InvalidHostname(hostname.clone()));
            }
        }

        let fw_url = update.fw_url.map(|url| normalize_base_url(&url));
        if let Some(fw_url) = &fw_url {
            FirmwareUrl::parse(fw_url)?;
        }

        if let Some(hostname) = hostname {
            self.hostname = hostname;
        }
        if let Some(fw_url) = fw_url {
            self.fw_url = fw_url;
        }
        Ok(())
    }
}

/// Fields an operator may change from the web UI; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConfigUpdate {
    pub hostname: Option<String>,
    #[serde(rename = "fwURL")]
    pub fw_url: Option<String>,
}
