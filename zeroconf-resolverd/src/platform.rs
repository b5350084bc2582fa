use anyhow::Result;
use serde::Deserialize;
use shared::protocol::{self, DEFAULT_DOMAIN, DEFAULT_PROTOCOL, DEFAULT_SERVICE_TYPE};
use shared::types::ServiceRecord;

/// What to browse for. Missing fields fall back to `_http._tcp.local.`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanRequest {
    #[serde(rename = "type", default = "default_service_type")]
    pub service_type: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            protocol: default_protocol(),
            domain: default_domain(),
        }
    }
}

impl ScanRequest {
    pub fn to_service_string(&self) -> String {
        protocol::service_type_string(&self.service_type, &self.protocol, &self.domain)
    }
}

/// Events reported by the discovery platform, in delivery order.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    ScanStarted,
    ScanStopped,
    Error(String),
    ServiceFound(ServiceRecord),
    ServiceRemoved(ServiceRecord),
    /// Outcome of the resolve request with the given transaction id
    ServiceResolved(u64, ServiceRecord),
    ResolveFailed(u64, ServiceRecord),
}

/// The discovery/resolution capability the coordinator drives.
///
/// Every call is fire-and-forget: outcomes come back later as [`PlatformEvent`]s on
/// the stream the facility was built with. An `Err` only means the request could not
/// be issued at all.
pub trait Facility: Send + Sync {
    fn scan(&self, request: &ScanRequest) -> Result<()>;
    fn stop_scan(&self) -> Result<()>;
    /// Resolves `name`. The outcome event carries `id` back unchanged.
    fn resolve(&self, id: u64, name: &str) -> Result<()>;
}
