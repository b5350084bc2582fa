use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use shared::types::ServiceRecord;
use crate::platform::{Facility, PlatformEvent, ScanRequest};

struct ActiveBrowse {
    service_type: String,
    cancel: CancellationToken,
}

/// Latest resolved info per full service name, as reported by the daemon's
/// background resolution.
#[derive(Default)]
struct ResolvedCache {
    records: Mutex<HashMap<String, ServiceRecord>>,
    updated: Notify,
}

impl ResolvedCache {
    fn insert(&self, record: ServiceRecord) {
        lock(&self.records).insert(record.name.clone(), record);
        self.updated.notify_waiters();
    }

    fn remove(&self, name: &str) {
        lock(&self.records).remove(name);
    }

    fn clear(&self) {
        lock(&self.records).clear();
    }

    /// A record only counts as resolved once it carries an address
    fn get_resolved(&self, name: &str) -> Option<ServiceRecord> {
        lock(&self.records)
            .get(name)
            .filter(|record| !record.addresses.is_empty())
            .cloned()
    }

    async fn wait_for(&self, name: &str, timeout: Duration) -> Option<ServiceRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register before checking so an insert in between is not missed
            let updated = self.updated.notified();
            if let Some(record) = self.get_resolved(name) {
                return Some(record);
            }
            if tokio::time::timeout_at(deadline, updated).await.is_err() {
                return None;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Facility`] backed by the `mdns-sd` daemon.
///
/// The daemon resolves browsed services on its own; `resolve` waits for that
/// result (up to `resolve_timeout`) and reports it as a resolved or failed event.
pub struct MdnsFacility {
    daemon: ServiceDaemon,
    events: mpsc::Sender<PlatformEvent>,
    resolve_timeout: Duration,
    cache: Arc<ResolvedCache>,
    browse: Mutex<Option<ActiveBrowse>>,
}

impl MdnsFacility {
    pub fn new(daemon: ServiceDaemon, events: mpsc::Sender<PlatformEvent>, resolve_timeout: Duration) -> Self {
        Self {
            daemon,
            events,
            resolve_timeout,
            cache: Arc::new(ResolvedCache::default()),
            browse: Mutex::new(None),
        }
    }

    fn end_browse(&self, browse: ActiveBrowse) -> Result<()> {
        browse.cancel.cancel();
        self.daemon
            .stop_browse(&browse.service_type)
            .with_context(|| format!("Failed to stop browsing {}", browse.service_type))?;
        tracing::info!("Stopped browsing {}", browse.service_type);
        Ok(())
    }
}

impl Facility for MdnsFacility {
    fn scan(&self, request: &ScanRequest) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("mDNS scan must be started from within the tokio runtime")?;
        let service_type = request.to_service_string();

        let mut browse = lock(&self.browse);
        if let Some(previous) = browse.take() {
            if let Err(e) = self.end_browse(previous) {
                tracing::warn!("Replacing scan: {:#}", e);
            }
        }
        self.cache.clear();

        let receiver = self
            .daemon
            .browse(&service_type)
            .with_context(|| format!("Failed to browse {}", service_type))?;

        let cancel = CancellationToken::new();
        runtime.spawn(forward_events(
            receiver,
            self.events.clone(),
            self.cache.clone(),
            cancel.clone(),
        ));

        tracing::info!("Browsing {}", service_type);
        *browse = Some(ActiveBrowse { service_type, cancel });
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        let Some(browse) = lock(&self.browse).take() else {
            return Ok(());
        };
        self.end_browse(browse)?;
        // The forwarder is gone, so report the stop ourselves
        if let Err(e) = self.events.try_send(PlatformEvent::ScanStopped) {
            tracing::warn!("Failed to report scan stop: {}", e);
        }
        Ok(())
    }

    fn resolve(&self, id: u64, name: &str) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("mDNS resolve must be requested from within the tokio runtime")?;
        // Pending resolves die with the browse they were issued under
        let (service_type, cancel) = match lock(&self.browse).as_ref() {
            Some(browse) => (browse.service_type.clone(), browse.cancel.child_token()),
            None => (String::new(), CancellationToken::new()),
        };

        runtime.spawn(report_resolution(
            id,
            ServiceRecord::named(name, service_type),
            self.cache.clone(),
            self.events.clone(),
            self.resolve_timeout,
            cancel,
        ));
        Ok(())
    }
}

/// Waits for the daemon to resolve `target` and reports the outcome for transaction `id`.
/// Nothing is reported if `cancel` fires first.
async fn report_resolution(
    id: u64,
    target: ServiceRecord,
    cache: Arc<ResolvedCache>,
    events: mpsc::Sender<PlatformEvent>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let name = target.name.clone();
    let event = tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            tracing::debug!("Dropping resolve {} for {}: browse ended", id, name);
            return;
        }
        record = cache.wait_for(&name, timeout) => match record {
            Some(record) => PlatformEvent::ServiceResolved(id, record),
            None => {
                tracing::debug!("No address for {} within {:?}", name, timeout);
                PlatformEvent::ResolveFailed(id, target)
            }
        },
    };
    if let Err(e) = events.send(event).await {
        tracing::error!("Failed to send resolve outcome: {}", e);
    }
}

async fn forward_events(
    receiver: flume::Receiver<ServiceEvent>,
    events: mpsc::Sender<PlatformEvent>,
    cache: Arc<ResolvedCache>,
    cancel: CancellationToken,
) {
    let mut started = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            event = receiver.recv_async() => {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("mDNS receiver disconnected: {}", e);
                        let _ = events.send(PlatformEvent::Error(format!("mDNS browse ended: {}", e))).await;
                        break;
                    }
                };
                let (forward, last) = match event {
                    // The daemon re-announces this on every query; report the first only
                    ServiceEvent::SearchStarted(_) if started => (None, false),
                    ServiceEvent::SearchStarted(ty) => {
                        tracing::debug!("Search started for {}", ty);
                        started = true;
                        (Some(PlatformEvent::ScanStarted), false)
                    }
                    ServiceEvent::ServiceFound(ty, fullname) => {
                        tracing::debug!("Service found: {}", fullname);
                        (Some(PlatformEvent::ServiceFound(ServiceRecord::named(fullname, ty))), false)
                    }
                    ServiceEvent::ServiceResolved(info) => {
                        cache.insert(convert_service_info(&info));
                        (None, false)
                    }
                    ServiceEvent::ServiceRemoved(ty, fullname) => {
                        tracing::debug!("Service removed: {}", fullname);
                        cache.remove(&fullname);
                        (Some(PlatformEvent::ServiceRemoved(ServiceRecord::named(fullname, ty))), false)
                    }
                    ServiceEvent::SearchStopped(ty) => {
                        tracing::debug!("Search stopped for {}", ty);
                        (Some(PlatformEvent::ScanStopped), true)
                    }
                    #[allow(unreachable_patterns)]
                    _ => (None, false),
                };
                if let Some(event) = forward {
                    if let Err(e) = events.send(event).await {
                        tracing::error!("Failed to forward platform event: {}", e);
                        break;
                    }
                }
                if last {
                    break;
                }
            }
        }
    }
}

/// Convert an mdns-sd ServiceInfo to our ServiceRecord
fn convert_service_info(info: &mdns_sd::ServiceInfo) -> ServiceRecord {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    let txt = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    ServiceRecord {
        name: info.get_fullname().to_string(),
        service_type: info.get_type().to_string(),
        hostname: Some(info.get_hostname().to_string()),
        addresses,
        port: Some(info.get_port()),
        txt,
        last_seen: Utc::now(),
    }
}
