//! Printer network address

use crate::error::{PrintError, PrintResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host and TCP port of a network printer
///
/// Two addresses are the same device iff host and port match exactly.
/// No DNS resolution or normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build from separate host and port strings (e.g. user input)
    pub fn parse(host: &str, port: &str) -> PrintResult<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(PrintError::InvalidAddress("empty host".to_string()));
        }
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| PrintError::InvalidAddress(format!("{}:{}", host, port)))?;
        if port == 0 {
            return Err(PrintError::InvalidAddress(format!("{}:0", host)));
        }
        Ok(Self::new(host, port))
    }

    /// Whether the port can be connected to
    pub fn has_valid_port(&self) -> bool {
        self.port != 0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DeviceAddress {
    type Err = PrintError;

    /// Parse `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PrintError::InvalidAddress(s.to_string()))?;
        Self::parse(host, port)
    }
}
