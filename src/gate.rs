use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Advisory limiter on simultaneous in-flight generation batches.
///
/// Callers are expected to check `can_start` before dispatching, but nothing
/// stops one that does not: `start` always hands out a permit. The permit
/// decrements the counter exactly once when dropped, so a batch orphaned by
/// its caller still releases capacity when it settles. The counter is
/// floor-clamped at zero.
#[derive(Debug)]
pub struct ConcurrencyGate {
    active: AtomicUsize,
    limit: usize,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        ConcurrencyGate {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    pub fn can_start(&self) -> bool {
        self.active.load(Ordering::Acquire) < self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn start(self: &Arc<Self>) -> BatchPermit {
        let previous = self.active.fetch_add(1, Ordering::AcqRel);
        if previous >= self.limit {
            warn!(
                "Generation batch dispatched past the advisory limit ({} already in flight, limit {})",
                previous, self.limit
            );
        }
        BatchPermit {
            gate: Arc::clone(self),
        }
    }

    fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
    }
}

/// Held for the lifetime of one batch; releasing is tied to Drop so it
/// happens exactly once no matter how the batch settles.
#[derive(Debug)]
pub struct BatchPermit {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for BatchPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_at_limit_and_reopens_after_settle() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        assert!(gate.can_start());

        let first = gate.start();
        assert!(gate.can_start());
        let second = gate.start();
        assert!(!gate.can_start());

        drop(first);
        assert!(gate.can_start());
        drop(second);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn advisory_start_past_limit_still_releases() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        let permits: Vec<BatchPermit> = (0..4).map(|_| gate.start()).collect();
        assert_eq!(gate.in_flight(), 4);
        drop(permits);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn counter_never_goes_negative() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        gate.release();
        gate.release();
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.can_start());
    }
}
