use std::time::Duration;

use crate::receipt::{Language, LanguageProfile, PrinterProfile, SetupProfile};

/// Upper bound for `NETPRINT_CHUNK_INTERVAL_MS`
pub const MAX_CHUNK_INTERVAL: Duration = Duration::from_secs(60);

/// Fleet configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | NETPRINT_RECONNECT_BACKOFF_MS | 250 | Delay before reconnecting a dropped device |
/// | NETPRINT_CHUNK_INTERVAL_MS | 100 | Gap between receipt chunks, at most 60000 |
/// | NETPRINT_DISCOVERY_TIMEOUT_MS | 200 | Per-probe timeout |
/// | NETPRINT_DISCOVERY_PORTS | 9100,8100,6100 | Ports probed per host |
/// | NETPRINT_CONNECT_TIMEOUT_MS | unset | TCP connect timeout (OS default when unset) |
/// | NETPRINT_AUTO_REGISTER | true | Add discovered printers to the fleet |
/// | NETPRINT_LANGUAGE | en | Receipt captions: `en` or `ru` |
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub reconnect_backoff: Duration,
    pub discovery_timeout: Duration,
    pub discovery_ports: Vec<u16>,
    pub connect_timeout: Option<Duration>,
    /// Register every discovered address automatically
    pub auto_register: bool,
    /// Profile given to every device added to the fleet
    pub profile: PrinterProfile,
}

impl FleetConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let language: Language = std::env::var("NETPRINT_LANGUAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Self {
            reconnect_backoff: env_millis("NETPRINT_RECONNECT_BACKOFF_MS")
                .unwrap_or(defaults.reconnect_backoff),
            discovery_timeout: env_millis("NETPRINT_DISCOVERY_TIMEOUT_MS")
                .unwrap_or(defaults.discovery_timeout),
            discovery_ports: std::env::var("NETPRINT_DISCOVERY_PORTS")
                .ok()
                .and_then(|v| parse_ports(&v))
                .unwrap_or(defaults.discovery_ports),
            connect_timeout: env_millis("NETPRINT_CONNECT_TIMEOUT_MS"),
            auto_register: std::env::var("NETPRINT_AUTO_REGISTER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.auto_register),
            profile: PrinterProfile {
                setup: SetupProfile::default(),
                language: LanguageProfile::from(language),
                chunk_interval: env_millis("NETPRINT_CHUNK_INTERVAL_MS")
                    .map(|interval| interval.min(MAX_CHUNK_INTERVAL))
                    .unwrap_or(defaults.profile.chunk_interval),
            },
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_millis(250),
            discovery_timeout: Duration::from_millis(200),
            discovery_ports: vec![9100, 8100, 6100],
            connect_timeout: None,
            auto_register: true,
            profile: PrinterProfile::default(),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_millis)
}

/// `"9100, 8100"` -> `[9100, 8100]`; `None` if any entry is not a valid port
fn parse_ports(value: &str) -> Option<Vec<u16>> {
    let ports: Vec<u16> = value
        .split(',')
        .map(|p| p.trim().parse::<u16>().ok().filter(|port| *port != 0))
        .collect::<Option<_>>()?;
    (!ports.is_empty()).then_some(ports)
}
