use serde::{Deserialize, Serialize};

/// Counters for a single collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectMetrics {
    pub cycles: u64,
    pub actions_performed: u64,
    pub responses_located: u64,
    pub capture_misses: u64,
    pub retries: u64,
    pub rate_limits: u64,
    pub items_accepted: u64,
    pub items_skipped: u64,
    pub duplicates_dropped: u64,
}

impl CollectMetrics {
    pub fn record_cycle(&mut self) {
        self.cycles = self.cycles.saturating_add(1);
    }

    pub fn record_actions(&mut self, count: u64) {
        self.actions_performed = self.actions_performed.saturating_add(count);
    }

    pub fn record_response(&mut self) {
        self.responses_located = self.responses_located.saturating_add(1);
    }

    pub fn record_capture_miss(&mut self) {
        self.capture_misses = self.capture_misses.saturating_add(1);
    }

    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }

    pub fn record_rate_limit(&mut self) {
        self.rate_limits = self.rate_limits.saturating_add(1);
    }

    pub fn record_item(&mut self) {
        self.items_accepted = self.items_accepted.saturating_add(1);
    }

    pub fn record_skip(&mut self) {
        self.items_skipped = self.items_skipped.saturating_add(1);
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates_dropped = self.duplicates_dropped.saturating_add(1);
    }

    /// Share of fetched items that were kept, as a percentage.
    pub fn yield_rate(&self) -> f64 {
        let seen = self.items_accepted + self.items_skipped + self.duplicates_dropped;
        if seen == 0 {
            0.0
        } else {
            (self.items_accepted as f64 / seen as f64) * 100.0
        }
    }
}
