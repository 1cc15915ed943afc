//! Cross-invocation usage accounting.
//!
//! Every agent invocation in a run folds its final usage into one
//! accumulator, so a multi-story run reports a single token and cost
//! total at the end.

use crate::agent::events::AgentUsage;

/// Running totals across all invocations of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageAccumulator {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub total_cost_usd: f64,
    pub invocations: u64,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one invocation's reported usage into the totals.
    ///
    /// Invocations that died before emitting a result event count toward
    /// `invocations` but contribute no tokens.
    pub fn add(&mut self, usage: Option<&AgentUsage>, cost: Option<f64>) {
        self.invocations += 1;
        if let Some(usage) = usage {
            self.input_tokens += usage.input_tokens;
            self.output_tokens += usage.output_tokens;
            self.cache_read_input_tokens += usage.cache_read_input_tokens;
            self.cache_creation_input_tokens += usage.cache_creation_input_tokens;
        }
        if let Some(cost) = cost {
            self.total_cost_usd += cost;
        }
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} invocation(s), {} input + {} output tokens ({} cache read, {} cache creation), ${:.4}",
            self.invocations,
            self.input_tokens,
            self.output_tokens,
            self.cache_read_input_tokens,
            self.cache_creation_input_tokens,
            self.total_cost_usd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> AgentUsage {
        AgentUsage {
            input_tokens: input,
            output_tokens: output,
            cache_read_input_tokens: 0,
            cache_creation_input_tokens: 0,
        }
    }

    #[test]
    fn accumulates_across_invocations() {
        let mut acc = UsageAccumulator::new();
        acc.add(Some(&usage(100, 20)), Some(0.05));
        acc.add(Some(&usage(200, 30)), Some(0.10));

        assert_eq!(acc.invocations, 2);
        assert_eq!(acc.input_tokens, 300);
        assert_eq!(acc.output_tokens, 50);
        assert!((acc.total_cost_usd - 0.15).abs() < 1e-9);
    }

    #[test]
    fn missing_usage_still_counts_invocation() {
        let mut acc = UsageAccumulator::new();
        acc.add(None, None);

        assert_eq!(acc.invocations, 1);
        assert_eq!(acc.input_tokens, 0);
        assert_eq!(acc.total_cost_usd, 0.0);
    }

    #[test]
    fn summary_mentions_cost() {
        let mut acc = UsageAccumulator::new();
        acc.add(Some(&usage(10, 5)), Some(0.5));
        assert!(acc.summary().contains("$0.5000"));
    }
}
