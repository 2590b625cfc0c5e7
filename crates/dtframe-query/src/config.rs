//! Per-call options for the group-by and rolling engines.
//!
//! Defaults come from the process-wide globals in `dtframe-config`, so an
//! environment override applies to every call that does not set its own.

/// Options for one group-by call.
#[derive(Debug, Clone)]
pub struct GroupByOptions {
    /// Log timing of populate/gather/eval phases and each regrowth.
    pub verbose: bool,

    /// Report progress (throttled) while iterating more than one group.
    pub show_progress: bool,

    /// Permuted groups at least this large gather each column in parallel.
    pub gather_parallel_min: usize,

    /// Worker-thread budget for the parallel gather.
    pub num_threads: usize,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        GroupByOptions {
            verbose: dtframe_config::get_verbose(),
            show_progress: dtframe_config::get_show_progress(),
            gather_parallel_min: dtframe_config::get_gather_parallel_min(),
            num_threads: dtframe_config::get_num_threads(),
        }
    }
}

/// Options for one rolling call.
#[derive(Debug, Clone)]
pub struct RollOptions {
    /// Replay informational notices and timings at debug level.
    pub verbose: bool,

    /// Worker-thread budget; the fast path further caps it at the pair count.
    pub num_threads: usize,
}

impl Default for RollOptions {
    fn default() -> Self {
        RollOptions {
            verbose: dtframe_config::get_verbose(),
            num_threads: dtframe_config::get_num_threads(),
        }
    }
}

impl RollOptions {
    /// Threads for `work_items` independent units under this budget.
    pub fn threads_for(&self, work_items: usize) -> usize {
        self.num_threads.min(work_items).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_for() {
        let opts = RollOptions {
            verbose: false,
            num_threads: 4,
        };
        assert_eq!(opts.threads_for(0), 1);
        assert_eq!(opts.threads_for(2), 2);
        assert_eq!(opts.threads_for(100), 4);
    }

    #[test]
    fn test_defaults_are_sane() {
        let opts = GroupByOptions::default();
        assert!(opts.num_threads >= 1);
    }
}
