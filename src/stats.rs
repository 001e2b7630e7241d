//! RTT statistics aggregation.
//!
//! Collects per-reply RTT samples (milliseconds) in arrival order and
//! computes the summary printed at the end of a campaign.

/// Summary statistics over a non-empty sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Mean of squared deviations from the mean (population variance).
    ///
    /// Printed under the `mdev` label; no square root is taken.
    pub mdev: f64,
}

/// Accumulates RTT samples for one run.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    samples: Vec<f64>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an RTT sample in milliseconds.
    pub fn add_sample(&mut self, rtt_ms: f64) {
        self.samples.push(rtt_ms);
    }

    /// Number of samples collected so far.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Compute summary statistics.
    ///
    /// Returns `None` when no sample has been collected.
    pub fn summarize(&self) -> Option<Summary> {
        if self.samples.is_empty() {
            return None;
        }

        let n = self.samples.len() as f64;
        let (min, max, sum) = self.samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        let mean = sum / n;
        let mdev = self
            .samples
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / n;

        Some(Summary {
            min,
            max,
            mean,
            mdev,
        })
    }
}
