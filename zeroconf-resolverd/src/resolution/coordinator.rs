use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use shared::types::{Notification, ServiceRecord};
use crate::platform::{Facility, ScanRequest};
use super::queue::ResolutionQueue;
use super::registry::Registry;
use super::transaction::TransactionSlot;

/// Timing knobs for the resolution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// Cooldown after a terminal event before the next resolve may be issued
    pub finalize_delay: Duration,
    /// How long a transaction may stay in flight before the watchdog reports it
    pub stall_threshold: Duration,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            finalize_delay: Duration::ZERO,
            stall_threshold: Duration::from_secs(20),
        }
    }
}

/// Drives discovered services through resolution one at a time.
///
/// Owns the registry, the pending queue and the transaction slot. It is not
/// synchronized itself: exactly one task owns it and feeds it events and ticks
/// in order (see `resolution_manager`).
pub struct Coordinator {
    pub(super) registry: Registry,
    pub(super) queue: ResolutionQueue,
    pub(super) transaction: TransactionSlot,
    pub(super) policy: ResolutionPolicy,
    facility: Arc<dyn Facility>,
    notifications: broadcast::Sender<Notification>,
    active_scan: Option<ScanRequest>,
    last_scan: Option<ScanRequest>,
}

/// Point-in-time view of the coordinator, for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub scanning: Option<String>,
    pub discovered: usize,
    pub resolved: usize,
    pub pending: Vec<String>,
    pub in_flight: Option<InFlight>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InFlight {
    pub id: u64,
    pub name: String,
    pub invalid: bool,
    pub elapsed_ms: u64,
}

impl Coordinator {
    pub fn new(
        facility: Arc<dyn Facility>,
        notifications: broadcast::Sender<Notification>,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            registry: Registry::new(),
            queue: ResolutionQueue::new(),
            transaction: TransactionSlot::new(),
            policy,
            facility,
            notifications,
            active_scan: None,
            last_scan: None,
        }
    }

    /// Clears all state and asks the platform to browse for `request`.
    pub fn begin_scan(&mut self, request: ScanRequest) -> anyhow::Result<()> {
        self.reset();
        self.active_scan = None;
        tracing::info!(service_type = %request.to_service_string(), "Starting scan");
        self.facility.scan(&request)?;
        self.active_scan = Some(request.clone());
        self.last_scan = Some(request);
        Ok(())
    }

    pub fn stop_scan(&mut self) -> anyhow::Result<()> {
        tracing::info!("Stopping scan");
        self.facility.stop_scan()?;
        self.active_scan = None;
        Ok(())
    }

    /// Stops and restarts the most recent scan, resetting all state.
    /// Returns false if no scan was ever started.
    pub fn restart_scan(&mut self) -> anyhow::Result<bool> {
        let Some(request) = self.last_scan.clone() else {
            return Ok(false);
        };
        if let Err(e) = self.facility.stop_scan() {
            tracing::warn!(error = %e, "Failed to stop scan before restart");
        }
        self.begin_scan(request)?;
        Ok(true)
    }

    fn reset(&mut self) {
        self.registry.clear();
        self.queue.clear();
        self.transaction.reset();
    }

    /// Periodic driver: when idle, issues a resolve for the queue head.
    /// The head stays queued until its terminal event arrives.
    /// Returns true if a resolve was issued.
    pub fn on_resolve_tick(&mut self, now: Instant) -> bool {
        if !self.transaction.is_idle(now) {
            return false;
        }
        let Some(head) = self.queue.peek_head() else {
            return false;
        };
        let name = head.name.clone();
        let id = self.transaction.begin(name.clone(), now);
        tracing::debug!(id, name = %name, pending = self.queue.len(), "Issuing resolve");

        if let Err(e) = self.facility.resolve(id, &name) {
            tracing::warn!(id, name = %name, error = %e, "Resolve request could not be issued");
            self.fail_resolution(id, &name, now);
        }
        true
    }

    /// Terminal success for transaction `id`. Outcomes of any other
    /// transaction, including ones from before a rescan, are dropped.
    pub fn complete_resolution(&mut self, id: u64, record: ServiceRecord, now: Instant) {
        if !self.transaction.is_current(id, &record.name) {
            tracing::warn!(id, name = %record.name, "Ignoring resolution for a transaction that is not in flight");
            return;
        }
        let Some(transaction) = self.transaction.finish(now, self.policy.finalize_delay) else {
            return;
        };
        if transaction.invalid {
            tracing::debug!(id = transaction.id, name = %record.name, "Discarding resolution of removed service");
            return;
        }

        tracing::debug!(id = transaction.id, name = %record.name, "Resolved");
        self.registry.upsert_resolved(record);
        self.queue.pop_head();
        self.notify(Notification::Resolved {
            services: self.registry.list_resolved(),
        });
    }

    /// Terminal failure for the in-flight transaction: soft requeue, and demote the
    /// service if it had been resolved before.
    pub fn fail_resolution(&mut self, id: u64, name: &str, now: Instant) {
        if !self.transaction.is_current(id, name) {
            tracing::warn!(id, name = %name, "Ignoring resolve failure for a transaction that is not in flight");
            return;
        }
        let Some(transaction) = self.transaction.finish(now, self.policy.finalize_delay) else {
            return;
        };
        if transaction.invalid {
            tracing::debug!(id = transaction.id, name = %name, "Discarding failure of removed service");
            return;
        }

        tracing::debug!(id = transaction.id, name = %name, "Resolve failed, requeueing");
        self.queue.requeue_head_to_tail();
        if self.registry.demote(name).is_some() {
            tracing::info!(name = %name, "Resolved service is no longer resolvable");
            self.notify(Notification::Remove {
                services: self.registry.list_resolved(),
            });
        }
    }

    /// External removal of `name`. If it is the in-flight target the transaction is
    /// invalidated and the head excised now; its later terminal event is a no-op.
    pub fn remove_service(&mut self, name: &str) {
        self.registry.remove_by_name(name);

        if self.transaction.invalidate(name) {
            tracing::debug!(name = %name, "Invalidating in-flight transaction");
            self.queue.pop_head();
        }
        self.queue.remove_all_by_name(name);

        self.notify(Notification::Remove {
            services: self.registry.list_resolved(),
        });
    }

    pub fn status(&self, now: Instant) -> CoordinatorStatus {
        CoordinatorStatus {
            scanning: self.active_scan.as_ref().map(ScanRequest::to_service_string),
            discovered: self.registry.discovered_len(),
            resolved: self.registry.resolved_len(),
            pending: self.queue.names(),
            in_flight: self.transaction.current().map(|transaction| InFlight {
                id: transaction.id,
                name: transaction.target.clone(),
                invalid: transaction.invalid,
                elapsed_ms: transaction.elapsed(now).as_millis() as u64,
            }),
        }
    }

    pub fn discovered(&self) -> Vec<ServiceRecord> {
        self.registry.list_discovered()
    }

    pub fn resolved(&self) -> Vec<ServiceRecord> {
        self.registry.list_resolved()
    }

    pub fn get_discovered(&self, name: &str) -> Option<ServiceRecord> {
        self.registry.get_discovered(name).cloned()
    }

    /// Surfaces a misuse or platform error to the application layer
    pub fn notify_error(&self, message: String) {
        self.notify(Notification::Error { message });
    }

    pub(super) fn notify(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }
}
