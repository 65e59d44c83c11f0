//! Per-governance compute cooldown.
//!
//! A governance is eligible again once `cooldown` seconds have passed since its
//! last successful compute. State lives in memory only and resets on restart.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ComputeGate {
    cooldown: i64,
    last_compute_at: HashMap<String, i64>,
}

impl ComputeGate {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: i64::try_from(cooldown_secs).unwrap_or(i64::MAX),
            last_compute_at: HashMap::new(),
        }
    }

    /// Whether `governance` may be recomputed at `now`.
    pub fn should_compute(&self, governance: &str, now: i64) -> bool {
        match self.last_compute_at.get(governance) {
            Some(last) => now.saturating_sub(*last) >= self.cooldown,
            None => true,
        }
    }

    /// Record a successful compute. Call only after the pass completed.
    pub fn mark_computed(&mut self, governance: &str, now: i64) {
        self.last_compute_at.insert(governance.to_string(), now);
    }
}
