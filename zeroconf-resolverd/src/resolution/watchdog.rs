use tokio::time::Instant;
use shared::types::Notification;
use super::coordinator::Coordinator;

impl Coordinator {
    /// Reports a transaction that has been in flight longer than the stall threshold.
    ///
    /// Report only: the transaction is left as it is and recovery is up to whoever
    /// listens for `StallDetected`. Fires on every qualifying tick.
    pub fn check_stall(&self, now: Instant) -> bool {
        let Some(transaction) = self.transaction.current() else {
            return false;
        };
        let elapsed = transaction.elapsed(now);
        if elapsed <= self.policy.stall_threshold {
            return false;
        }

        tracing::warn!(
            id = transaction.id,
            name = %transaction.target,
            elapsed_ms = elapsed.as_millis() as u64,
            "Resolution appears stalled"
        );
        self.notify(Notification::StallDetected {
            name: transaction.target.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
        true
    }

    /// Re-queues every discovered service when nothing is pending, so resolved data
    /// gets refreshed even if no new "found" event arrives. Returns how many were queued.
    pub fn backfill(&mut self) -> usize {
        if !self.queue.is_empty() || self.registry.discovered_len() == 0 {
            return 0;
        }
        let services = self.registry.list_discovered();
        let count = services.len();
        for record in services {
            self.queue.enqueue(record);
        }
        tracing::debug!(count, "Backfilled resolution queue");
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;
    use crate::resolution::testing::{self, record, resolved_record};
    use crate::resolution::ResolutionPolicy;

    fn policy() -> ResolutionPolicy {
        ResolutionPolicy {
            stall_threshold: Duration::from_secs(30),
            ..ResolutionPolicy::default()
        }
    }

    #[test]
    fn test_stall_reported_on_every_qualifying_tick() {
        let (mut coordinator, _facility, mut rx) = testing::coordinator(policy());
        coordinator.queue.enqueue(record("a"));
        let start = Instant::now();
        coordinator.on_resolve_tick(start);

        assert!(!coordinator.check_stall(start + Duration::from_secs(10)));
        assert!(!coordinator.check_stall(start + Duration::from_secs(30)));
        assert!(coordinator.check_stall(start + Duration::from_secs(31)));
        assert!(coordinator.check_stall(start + Duration::from_secs(41)));

        assert_eq!(
            testing::drain(&mut rx),
            [
                Notification::StallDetected {
                    name: "a".to_string(),
                    elapsed_ms: 31_000
                },
                Notification::StallDetected {
                    name: "a".to_string(),
                    elapsed_ms: 41_000
                },
            ]
        );
        // Report only
        assert!(coordinator.transaction.is_target("a"));
        assert_eq!(coordinator.queue.names(), ["a"]);
    }

    #[test]
    fn test_no_stall_when_idle() {
        let (coordinator, _facility, mut rx) = testing::coordinator(policy());
        assert!(!coordinator.check_stall(Instant::now() + Duration::from_secs(3600)));
        assert!(testing::drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stall_clears_once_terminal_event_arrives() {
        let (mut coordinator, _facility, _rx) = testing::coordinator(policy());
        coordinator.queue.enqueue(record("a"));
        let start = Instant::now();
        coordinator.on_resolve_tick(start);
        assert!(coordinator.check_stall(start + Duration::from_secs(31)));

        coordinator.complete_resolution(1, resolved_record("a"), start + Duration::from_secs(35));
        assert!(!coordinator.check_stall(start + Duration::from_secs(41)));
    }

    #[test]
    fn test_backfill_requeues_discovered_in_name_order() {
        let (mut coordinator, _facility, _rx) = testing::coordinator(policy());
        coordinator.registry.upsert_discovered(record("b"));
        coordinator.registry.upsert_resolved(resolved_record("a"));

        assert_eq!(coordinator.backfill(), 2);
        assert_eq!(coordinator.queue.names(), ["a", "b"]);
    }

    #[test]
    fn test_backfill_skips_when_queue_busy_or_nothing_discovered() {
        let (mut coordinator, _facility, _rx) = testing::coordinator(policy());
        assert_eq!(coordinator.backfill(), 0);

        coordinator.registry.upsert_discovered(record("a"));
        coordinator.registry.upsert_discovered(record("b"));
        coordinator.queue.enqueue(record("b"));
        assert_eq!(coordinator.backfill(), 0);
        assert_eq!(coordinator.queue.names(), ["b"]);
    }
}
