use std::time::{Duration, Instant};

/// Turn a budget in seconds into a duration. Infinite budgets mean "no
/// deadline", negative ones are clamped to zero.
pub fn budget_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_infinite() && secs > 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
}

/// Wall-clock budget of one search, checked between growth iterations.
#[derive(Debug, Clone, Copy)]
pub struct SearchDeadline {
    start: Instant,
    budget: Option<Duration>,
}

impl SearchDeadline {
    pub fn start(budget: Option<Duration>) -> Self {
        SearchDeadline {
            start: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::start(None)
    }

    /// A zero budget is expired from the start.
    pub fn expired(&self) -> bool {
        match self.budget {
            None => false,
            Some(budget) => self.start.elapsed() >= budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
