use std::collections::BTreeMap;
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A service seen on the network, keyed by its unique `name`.
/// Only `name` matters to the resolution core; the rest is whatever the
/// platform reported and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Full DNS-SD instance name, e.g. "printer._ipp._tcp.local."
    pub name: String,

    /// Service type, e.g. "_ipp._tcp.local."
    pub service_type: String,

    /// Hostname, e.g. "printer.local." (known once resolved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Resolved addresses
    #[serde(default)]
    pub addresses: Vec<IpAddr>,

    /// Service port (known once resolved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// TXT record key-value pairs
    #[serde(default)]
    pub txt: BTreeMap<String, String>,

    /// Last time the platform reported on this service
    pub last_seen: DateTime<Utc>,
}

impl ServiceRecord {
    /// A record carrying nothing but its identity, as delivered by "found" and "removed" events.
    pub fn named(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            hostname: None,
            addresses: Vec::new(),
            port: None,
            txt: BTreeMap::new(),
            last_seen: Utc::now(),
        }
    }

    /// Transport protocol label taken from the service type ("tcp" / "udp").
    pub fn protocol(&self) -> Option<&str> {
        self.service_type
            .split('.')
            .nth(1)
            .and_then(|label| label.strip_prefix('_'))
    }

    /// Domain taken from the service type, e.g. "local."
    pub fn domain(&self) -> Option<&str> {
        let mut dots = self.service_type.match_indices('.').map(|(i, _)| i);
        let second = dots.nth(1)?;
        let domain = &self.service_type[second + 1..];
        (!domain.is_empty()).then_some(domain)
    }
}

/// Notifications delivered to the application layer.
/// Service sets are always sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Start,
    Stop,
    Error { message: String },
    Found { services: Vec<ServiceRecord> },
    Resolved { services: Vec<ServiceRecord> },
    Remove { services: Vec<ServiceRecord> },
    StallDetected { name: String, elapsed_ms: u64 },
}
