use serde::{Deserialize, Serialize};

/// Snapshot of one queue's depth by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub total: usize,
}

impl QueueStats {
    /// `total` is always the sum of the five state counts.
    pub fn new(
        waiting: usize,
        active: usize,
        completed: usize,
        failed: usize,
        delayed: usize,
    ) -> Self {
        Self {
            waiting,
            active,
            completed,
            failed,
            delayed,
            total: waiting + active + completed + failed + delayed,
        }
    }

    /// Jobs that still consume or will consume worker capacity.
    pub fn load(&self) -> usize {
        self.waiting + self.active
    }
}

/// Monotonic per-type run counters kept by the scheduler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
}

impl TaskStats {
    /// Success rate as a percentage string, `0.0%` before any run.
    pub fn success_rate(&self) -> String {
        if self.total_runs == 0 {
            return "0.0%".to_string();
        }
        let rate = self.successful_runs as f64 / self.total_runs as f64 * 100.0;
        format!("{rate:.1}%")
    }
}
