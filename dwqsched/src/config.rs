use std::time::Duration;

/// Engine configuration recognized at init.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum number of bodies executing at once.
    pub parallelism_cap: usize,
    /// Floor on a request's backoff base delay.
    pub min_backoff_ms: i64,
    /// Ceiling on any computed backoff delay.
    pub max_backoff_ms: i64,
    /// Floor on a periodic request's period.
    pub minimum_period_ms: i64,
    /// How long terminal records are retained before the sweep removes
    /// them.
    pub retention_after_terminal_ms: i64,
    /// Grace period a cancelled body gets to wind down before its slot
    /// is reclaimed.
    pub quiescence_deadline: Duration,
    /// Whether a panicking body consumes a retry (true) or fails
    /// terminally (false).
    pub panic_is_retry: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism_cap: 4,
            min_backoff_ms: 10 * 1000,
            max_backoff_ms: 5 * 3600 * 1000,
            minimum_period_ms: 15 * 60 * 1000,
            retention_after_terminal_ms: 7 * 24 * 3600 * 1000,
            quiescence_deadline: Duration::from_secs(5),
            panic_is_retry: true,
        }
    }
}
