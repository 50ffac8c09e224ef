//! Rolling latency samples for sparkline rendering.

use std::collections::VecDeque;

/// Number of samples kept.
pub const LATENCY_HISTORY_LEN: usize = 10;

/// Fixed-length ring of the most recent latency samples in milliseconds.
///
/// Starts as ten zeros; every push evicts the oldest value, so
/// [`len`](Self::len) is always [`LATENCY_HISTORY_LEN`]. Missing samples are
/// recorded as `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyHistory {
    samples: VecDeque<u64>,
}

impl LatencyHistory {
    /// Creates a history seeded with zeros.
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: std::iter::repeat_n(0, LATENCY_HISTORY_LEN).collect(),
        }
    }

    /// Appends `sample`, dropping the oldest one.
    pub fn push(&mut self, sample: u64) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    /// Records a probe result; a failed probe counts as `0`.
    pub fn record(&mut self, latency_ms: Option<u64>) {
        self.push(latency_ms.unwrap_or(0));
    }

    /// Samples, oldest first.
    #[must_use]
    pub fn values(&self) -> Vec<u64> {
        self.samples.iter().copied().collect()
    }

    /// Most recent sample.
    #[must_use]
    pub fn latest(&self) -> u64 {
        self.samples.back().copied().unwrap_or(0)
    }

    /// Always [`LATENCY_HISTORY_LEN`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history holds no samples; a new history is seeded, so
    /// this is `false`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LatencyHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_zeros() {
        let h = LatencyHistory::new();
        assert_eq!(h.values(), vec![0; 10]);
        assert_eq!(h.latest(), 0);
    }

    #[test]
    fn eleven_pushes_evict_the_first() {
        let mut h = LatencyHistory::new();
        for v in 1..=11 {
            h.push(v);
        }
        assert_eq!(h.len(), 10);
        assert_eq!(h.values(), (2..=11).collect::<Vec<_>>());
        assert_eq!(h.latest(), 11);
    }

    #[test]
    fn length_is_invariant() {
        let mut h = LatencyHistory::new();
        for n in 0..25 {
            assert_eq!(h.len(), LATENCY_HISTORY_LEN, "after {n} pushes");
            h.push(n);
        }
    }

    #[test]
    fn failed_probe_records_zero() {
        let mut h = LatencyHistory::new();
        h.record(Some(42));
        h.record(None);
        let v = h.values();
        assert_eq!(&v[8..], &[42, 0]);
    }
}
