use tokio::time::Instant;
use shared::types::Notification;
use crate::platform::PlatformEvent;
use super::coordinator::Coordinator;

impl Coordinator {
    /// Applies one platform event to the registry/queue and emits the matching notification.
    pub fn dispatch(&mut self, event: PlatformEvent, now: Instant) {
        match event {
            PlatformEvent::ScanStarted => self.notify(Notification::Start),
            PlatformEvent::ScanStopped => self.notify(Notification::Stop),
            PlatformEvent::Error(message) => self.notify(Notification::Error { message }),
            PlatformEvent::ServiceFound(record) => {
                let name = record.name.clone();
                // Already pending: refresh the registry entry but don't queue it twice
                let pending = self.queue.contains(&name);
                self.registry.upsert_discovered(record.clone());
                if !pending {
                    self.queue.enqueue(record);
                }
                tracing::debug!(name = %name, pending, "Service found");
                self.notify(Notification::Found {
                    services: self.registry.list_discovered(),
                });
            }
            PlatformEvent::ServiceRemoved(record) => {
                tracing::debug!(name = %record.name, "Service removed");
                self.remove_service(&record.name);
            }
            PlatformEvent::ServiceResolved(id, record) => self.complete_resolution(id, record, now),
            PlatformEvent::ResolveFailed(id, record) => self.fail_resolution(id, &record.name, now),
        }
    }
}
