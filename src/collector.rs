//! Per-pass error collection.
//!
//! A build pass never stops at the first failure: each step records what
//! went wrong under its own name and the pass decides after every step
//! whether to go on. One collector lives for exactly one pass.

use crate::builder::BuildError;

/// Errors grouped by step. Steps keep the order they first failed in,
/// which is pipeline order.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<(String, Vec<BuildError>)>,
    count: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error under `step`.
    pub fn add(&mut self, step: &str, err: impl Into<BuildError>) {
        let err = err.into();
        match self.errors.iter_mut().find(|(name, _)| name == step) {
            Some((_, errors)) => errors.push(err),
            None => self.errors.push((step.to_string(), vec![err])),
        }
        self.count += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Errors recorded under `step`, in recording order.
    pub fn step(&self, step: &str) -> &[BuildError] {
        self.errors
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, errors)| errors.as_slice())
            .unwrap_or(&[])
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &[BuildError])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Log every recorded error, grouped by step.
    pub fn dump(&self, site: &str) {
        for (step, errors) in self.steps() {
            for err in errors {
                tracing::error!(site, step, "{err}");
            }
        }
    }
}
