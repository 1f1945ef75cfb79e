use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-plan after the given delay
    Retry { after: Duration, errors: u32 },
    /// Give up on this cycle; the periodic driver will try again
    Abandon { errors: u32 },
}

/// Counts consecutive event source failures.
///
/// The counter is only reset by a successful query; abandoning a cycle
/// leaves it at `max_errors`, so the next failure after an abandonment
/// abandons again immediately.
#[derive(Debug, Clone)]
pub struct RetryController {
    errors_in_a_row: u32,
    max_errors: u32,
    retry_delay: Duration,
}

impl RetryController {
    pub fn new(max_errors: u32, retry_delay: Duration) -> Self {
        Self {
            errors_in_a_row: 0,
            max_errors,
            retry_delay,
        }
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        self.errors_in_a_row = (self.errors_in_a_row + 1).min(self.max_errors);

        if self.errors_in_a_row < self.max_errors {
            RetryDecision::Retry {
                after: self.retry_delay,
                errors: self.errors_in_a_row,
            }
        } else {
            RetryDecision::Abandon {
                errors: self.errors_in_a_row,
            }
        }
    }

    pub fn reset(&mut self) {
        self.errors_in_a_row = 0;
    }

    pub fn errors(&self) -> u32 {
        self.errors_in_a_row
    }
}
