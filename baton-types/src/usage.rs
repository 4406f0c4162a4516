//! Token and request counters.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Usage reported by the model backend, summed per turn and per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of backend requests.
    pub requests: u64,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Input plus output tokens.
    pub total_tokens: u64,
}

impl Usage {
    /// Usage for a single request.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            requests: 1,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Add another usage record into this one.
    pub fn add(&mut self, other: &Usage) {
        self.requests += other.requests;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl AddAssign<&Usage> for Usage {
    fn add_assign(&mut self, rhs: &Usage) {
        self.add(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counts_one_request() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn add_accumulates_all_counters() {
        let mut total = Usage::default();
        total += &Usage::new(10, 5);
        total += &Usage::new(3, 2);
        assert_eq!(
            total,
            Usage {
                requests: 2,
                input_tokens: 13,
                output_tokens: 7,
                total_tokens: 20,
            }
        );
    }
}
