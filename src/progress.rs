use std::time::Duration;

use tokio::time::Instant;

/// Point-in-time view of a run, produced by the scheduler for whoever
/// renders progress.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    pub started_at: Instant,
    pub req_count: usize,
    pub req_total: usize,
    pub queue_pos: usize,
    pub queue_total: usize,
    pub error_count: usize,
}

impl Progress {
    pub fn new(req_total: usize, queue_total: usize) -> Self {
        Self {
            started_at: Instant::now(),
            req_count: 0,
            req_total,
            queue_pos: 0,
            queue_total,
            error_count: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn req_per_sec(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.req_count as f64 / secs
    }

    pub fn is_done(&self) -> bool {
        self.req_count >= self.req_total
    }
}
