use std::time::Duration;
use tokio::time::Instant;

/// Bookkeeping for the one outstanding resolve request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
    pub target: String,
    pub started_at: Instant,
    /// The target was removed while in flight; its terminal event must be discarded.
    pub invalid: bool,
}

impl Transaction {
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Idle,
    Resolving(Transaction),
    CoolingDown { until: Instant },
}

/// Holds at most one [`Transaction`]. After a terminal event the slot can
/// optionally stay busy for a cooldown before the next resolve may start.
#[derive(Debug)]
pub struct TransactionSlot {
    state: SlotState,
    next_id: u64,
}

impl Default for TransactionSlot {
    fn default() -> Self {
        Self {
            state: SlotState::Idle,
            next_id: 1,
        }
    }
}

impl TransactionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a new resolve may be issued at `now`. An elapsed cooldown is cleared here.
    pub fn is_idle(&mut self, now: Instant) -> bool {
        match self.state {
            SlotState::Idle => true,
            SlotState::Resolving(_) => false,
            SlotState::CoolingDown { until } if now >= until => {
                self.state = SlotState::Idle;
                true
            }
            SlotState::CoolingDown { .. } => false,
        }
    }

    /// Starts a transaction for `target` and returns its id.
    /// Callers check [`is_idle`](Self::is_idle) first.
    pub fn begin(&mut self, target: String, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.state = SlotState::Resolving(Transaction {
            id,
            target,
            started_at: now,
            invalid: false,
        });
        id
    }

    pub fn current(&self) -> Option<&Transaction> {
        match &self.state {
            SlotState::Resolving(transaction) => Some(transaction),
            _ => None,
        }
    }

    /// Whether `name` is the target of the active transaction
    #[cfg(test)]
    pub fn is_target(&self, name: &str) -> bool {
        self.current().is_some_and(|transaction| transaction.target == name)
    }

    /// Whether an outcome for transaction `id` on `name` belongs to the active transaction
    pub fn is_current(&self, id: u64, name: &str) -> bool {
        self.current()
            .is_some_and(|transaction| transaction.id == id && transaction.target == name)
    }

    /// Marks the active transaction invalid if it targets `name` and is still valid.
    /// Returns true only on that transition.
    pub fn invalidate(&mut self, name: &str) -> bool {
        match &mut self.state {
            SlotState::Resolving(transaction) if transaction.target == name && !transaction.invalid => {
                transaction.invalid = true;
                true
            }
            _ => false,
        }
    }

    /// Closes the active transaction, entering a cooldown when `cooldown` is non-zero.
    pub fn finish(&mut self, now: Instant, cooldown: Duration) -> Option<Transaction> {
        let next = if cooldown.is_zero() {
            SlotState::Idle
        } else {
            SlotState::CoolingDown { until: now + cooldown }
        };
        match std::mem::replace(&mut self.state, next) {
            SlotState::Resolving(transaction) => Some(transaction),
            previous => {
                self.state = previous;
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = SlotState::Idle;
    }
}
