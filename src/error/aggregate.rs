//! Error aggregation for teardown.
//!
//! Teardown attempts every step; each failure is recorded under the label
//! of the step that produced it and reported together at the end.

use std::fmt;

use crate::error::BoxError;

/// Accumulates labelled failures.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<(String, BoxError)>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure under `label`.
    pub fn push(&mut self, label: impl Into<String>, error: BoxError) {
        self.errors.push((label.into(), error));
    }

    /// Record the outcome of a step. The label is only rendered on failure.
    pub fn record<F>(&mut self, result: Result<(), BoxError>, label: F)
    where
        F: FnOnce() -> String,
    {
        if let Err(error) = result {
            self.push(label(), error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok` when nothing was recorded.
    pub fn finish(self) -> Result<(), AggregateError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError {
                errors: self.errors,
            })
        }
    }
}

/// Every failure recorded during one teardown, in the order they happened.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<(String, BoxError)>,
}

impl AggregateError {
    /// Labelled failures in insertion order.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &(dyn std::error::Error + Send + Sync))> {
        self.errors.iter().map(|(l, e)| (l.as_str(), e.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (label, error)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", label, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|(_, e)| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_aggregation_is_ok() {
        let mut agg = ErrorAggregator::new();
        agg.record(Ok(()), || "close router".into());
        assert!(agg.is_empty());
        assert!(agg.finish().is_ok());
    }

    #[test]
    fn test_keeps_every_error_and_label() {
        let mut agg = ErrorAggregator::new();
        agg.record(Err("socket busy".into()), || "close inbound/direct[0]".into());
        agg.record(Ok(()), || unreachable!());
        agg.push("close router", "dns still running".into());

        let err = agg.finish().unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(
            err.to_string(),
            "close inbound/direct[0]: socket busy; close router: dns still running"
        );
        let labels: Vec<&str> = err.errors().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["close inbound/direct[0]", "close router"]);
    }

    #[test]
    fn test_source_is_first_cause() {
        let mut agg = ErrorAggregator::new();
        agg.push("close a", "first".into());
        agg.push("close b", "second".into());
        let err = agg.finish().unwrap_err();
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "first");
    }
}
