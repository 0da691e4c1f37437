//! Accumulates job results until they are worth a `done`.

use proletariat_core::protocol::JobResult;

/// Pending results, flushed at a size threshold or when the agent goes idle.
#[derive(Debug)]
pub struct ResultBatcher {
    pending: Vec<JobResult>,
    threshold: usize,
}

impl ResultBatcher {
    /// Batcher flushing once `threshold` results are pending (at least one).
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    /// Queue a result.
    pub fn push(&mut self, result: JobResult) {
        self.pending.push(result);
    }

    /// Whether pending results should be sent now.
    pub fn should_flush(&self, idle: bool) -> bool {
        !self.is_empty() && (idle || self.len() >= self.threshold)
    }

    /// Take every pending result, leaving the batcher empty.
    pub fn take(&mut self) -> Vec<JobResult> {
        std::mem::take(&mut self.pending)
    }

    /// Discard pending results.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of pending results.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proletariat_core::ids::JobId;
    use proletariat_core::protocol::JobOutcome;

    fn result(id: i64) -> JobResult {
        JobResult {
            id: JobId::Number(id),
            result: JobOutcome::default(),
        }
    }

    #[test]
    fn flushes_at_threshold() {
        let mut batcher = ResultBatcher::new(2);
        batcher.push(result(1));
        assert!(!batcher.should_flush(false));
        batcher.push(result(2));
        assert!(batcher.should_flush(false));

        let taken = batcher.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].id, JobId::Number(1));
        assert!(batcher.is_empty());
    }

    #[test]
    fn flushes_when_idle() {
        let mut batcher = ResultBatcher::new(5);
        assert!(!batcher.should_flush(true));
        batcher.push(result(1));
        assert!(batcher.should_flush(true));
        assert!(!batcher.should_flush(false));
    }

    #[test]
    fn threshold_is_at_least_one() {
        let mut batcher = ResultBatcher::new(0);
        assert!(!batcher.should_flush(false));
        batcher.push(result(1));
        assert!(batcher.should_flush(false));
        batcher.clear();
        assert_eq!(batcher.len(), 0);
    }
}
