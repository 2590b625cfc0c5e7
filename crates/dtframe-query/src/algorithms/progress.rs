//! Throttled progress reporting for long group-by calls.

use std::time::{Duration, Instant};

use log::info;

const GRACE: Duration = Duration::from_secs(3);
const INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct Progress {
    enabled: bool,
    total: usize,
    started: Instant,
    last: Option<Instant>,
}

impl Progress {
    /// Reports only when requested and there is more than one group.
    pub(crate) fn new(requested: bool, total: usize) -> Self {
        Progress {
            enabled: requested && total > 1,
            total,
            started: Instant::now(),
            last: None,
        }
    }

    /// Record that `done` groups have been processed.
    pub(crate) fn tick(&mut self, done: usize) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.started);
        if elapsed < GRACE {
            return;
        }
        if self.last.is_some_and(|t| now.duration_since(t) < INTERVAL) {
            return;
        }
        self.last = Some(now);
        let frac = done as f64 / self.total as f64;
        let eta = if done > 0 {
            elapsed.as_secs_f64() * (1.0 - frac) / frac
        } else {
            0.0
        };
        info!(
            "Processed {} groups out of {}. {:.0}% done. Time elapsed: {}s. ETA: {:.0}s.",
            done,
            self.total,
            100.0 * frac,
            elapsed.as_secs(),
            eta
        );
    }

    /// Final 100% line, only if anything was reported.
    pub(crate) fn finish(&self) {
        if self.last.is_some() {
            info!(
                "Processed {} groups out of {}. 100% done. Time elapsed: {}s. ETA: 0s.",
                self.total,
                self.total,
                self.started.elapsed().as_secs()
            );
        }
    }

    #[cfg(test)]
    fn reported(&self) -> bool {
        self.last.is_some()
    }
}
