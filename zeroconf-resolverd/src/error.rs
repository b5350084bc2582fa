//! Errors surfaced by the resolution coordinator

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolverError>;

#[derive(Debug, Error)]
pub enum ResolverError {
    /// The platform event stream may only be attached once
    #[error("platform event listeners already in place")]
    AlreadySubscribed,

    /// A restart was requested before any scan was started
    #[error("no scan has been started")]
    NoScan,

    /// The coordinator task has exited
    #[error("coordinator task is no longer running")]
    CoordinatorGone,

    /// The platform refused a scan/stop request
    #[error("platform facility error: {0}")]
    Facility(#[from] anyhow::Error),
}
