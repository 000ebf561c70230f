//! Progress accounting for one upload session.
//!
//! Byte-level callbacks from the transport land here; the orchestrator
//! decides how often the result is published.

/// Per-chunk and aggregate upload progress.
///
/// Each chunk's percent never decreases within one attempt. The aggregate
/// is `sum(size * percent) / total_size`, clamped so that it never drops
/// below a value already reported: when a paused chunk restarts from 0%
/// the displayed total holds still instead of moving backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    sizes: Vec<u64>,
    percents: Vec<f64>,
    total: u64,
    reported: f64,
}

impl ProgressTracker {
    /// Creates a tracker for chunks of the given sizes, all at 0%.
    pub fn new(sizes: Vec<u64>) -> Self {
        let total = sizes.iter().sum();
        let percents = vec![0.0; sizes.len()];
        Self {
            sizes,
            percents,
            total,
            reported: 0.0,
        }
    }

    /// Starts a new attempt for chunk `index`, resetting it to 0%.
    ///
    /// Returns the aggregate, which does not drop.
    pub fn begin_attempt(&mut self, index: usize) -> f64 {
        if let Some(p) = self.percents.get_mut(index) {
            *p = 0.0;
        }
        self.recompute()
    }

    /// Records progress for chunk `index` and returns the aggregate.
    ///
    /// Values are clamped to `[0, 100]`; a lower value than the chunk
    /// already has is ignored.
    pub fn update(&mut self, index: usize, percent: f64) -> f64 {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        if let Some(p) = self.percents.get_mut(index) {
            if percent > *p {
                *p = percent;
            }
        }
        self.recompute()
    }

    /// Marks chunk `index` as fully uploaded.
    pub fn complete(&mut self, index: usize) -> f64 {
        self.update(index, 100.0)
    }

    /// Current percent of chunk `index` (0 if out of range).
    pub fn percent(&self, index: usize) -> f64 {
        self.percents.get(index).copied().unwrap_or(0.0)
    }

    /// Per-chunk percents in index order.
    pub fn percents(&self) -> &[f64] {
        &self.percents
    }

    /// The aggregate percent last reported.
    pub fn aggregate(&self) -> f64 {
        self.reported
    }

    /// Returns `true` once every chunk is at 100%.
    pub fn is_complete(&self) -> bool {
        self.percents.iter().all(|&p| p >= 100.0)
    }

    fn recompute(&mut self) -> f64 {
        if self.total == 0 {
            return self.reported;
        }
        let weighted: f64 = self
            .sizes
            .iter()
            .zip(&self.percents)
            .map(|(&size, &pct)| size as f64 * pct)
            .sum();
        let computed = weighted / self.total as f64;
        if computed > self.reported {
            self.reported = computed.min(100.0);
        }
        self.reported
    }
}
