//! Per-actor messaging counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by an actor's messenger and dispatcher
#[derive(Debug, Default)]
pub struct MailmanStats {
    pub messages_sent: AtomicU64,
    pub messages_dispatched: AtomicU64,
    pub messages_unmatched: AtomicU64,
    pub handler_failures: AtomicU64,
    pub replies_matched: AtomicU64,
    pub wait_timeouts: AtomicU64,
    pub messages_restored: AtomicU64,
}

impl MailmanStats {
    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatch cycle that had a message in hand
    pub fn record_dispatch(&self, matched: bool, failures: u64) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
        if !matched {
            self.messages_unmatched.fetch_add(1, Ordering::Relaxed);
        }
        self.handler_failures.fetch_add(failures, Ordering::Relaxed);
    }

    /// Record the end of a wait for reply
    pub fn record_wait(&self, matched: bool, restored: usize) {
        if matched {
            self.replies_matched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.messages_restored
            .fetch_add(restored as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            messages_unmatched: self.messages_unmatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            messages_restored: self.messages_restored.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MailmanStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_sent: u64,
    pub messages_dispatched: u64,
    pub messages_unmatched: u64,
    pub handler_failures: u64,
    pub replies_matched: u64,
    pub wait_timeouts: u64,
    pub messages_restored: u64,
}

impl StatsSnapshot {
    /// Share of dispatched messages that reached at least one callback
    pub fn match_rate(&self) -> f64 {
        if self.messages_dispatched == 0 {
            return 1.0;
        }
        let matched = self.messages_dispatched - self.messages_unmatched;
        matched as f64 / self.messages_dispatched as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = MailmanStats::default();
        stats.record_sent();
        stats.record_dispatch(true, 1);
        stats.record_dispatch(false, 0);
        stats.record_wait(true, 2);
        stats.record_wait(false, 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.messages_dispatched, 2);
        assert_eq!(snapshot.messages_unmatched, 1);
        assert_eq!(snapshot.handler_failures, 1);
        assert_eq!(snapshot.replies_matched, 1);
        assert_eq!(snapshot.wait_timeouts, 1);
        assert_eq!(snapshot.messages_restored, 5);
        assert_eq!(snapshot.match_rate(), 0.5);
    }

    #[test]
    fn test_match_rate_without_traffic() {
        assert_eq!(StatsSnapshot::default().match_rate(), 1.0);
    }
}
