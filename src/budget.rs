use std::time::{Duration, Instant};

/// The time oracle: a stopwatch the driver polls between iterations and
/// between intensification sub-steps. The core never blocks on it.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    start: Instant,
    limit: Option<Duration>,
}

impl TimeBudget {
    pub fn new(limit: Duration) -> Self {
        TimeBudget {
            start: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unlimited() -> Self {
        TimeBudget {
            start: Instant::now(),
            limit: None,
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.start.elapsed()),
            None => Duration::MAX,
        }
    }

    pub fn expired(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
