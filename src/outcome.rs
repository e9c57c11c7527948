//! Uniform classification result shared by every engine step.

use crate::error::ProvisionError;

/// Result of one classification step.
///
/// Raw status codes are classified once, at the edge; the orchestrator only
/// ever branches on this tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Proceed(T),
    Retry(ProvisionError),
    Fail(ProvisionError),
}

impl<T> RetryOutcome<T> {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RetryOutcome<U> {
        match self {
            Self::Proceed(value) => RetryOutcome::Proceed(f(value)),
            Self::Retry(reason) => RetryOutcome::Retry(reason),
            Self::Fail(reason) => RetryOutcome::Fail(reason),
        }
    }

    /// Collapse into a `Result`, treating `Retry` as an error as well.
    /// Used where a step has no retry loop of its own (reads, decoding).
    pub fn into_result(self) -> Result<T, ProvisionError> {
        match self {
            Self::Proceed(value) => Ok(value),
            Self::Retry(reason) | Self::Fail(reason) => Err(reason),
        }
    }
}

impl<T> From<Result<T, ProvisionError>> for RetryOutcome<T> {
    fn from(result: Result<T, ProvisionError>) -> Self {
        match result {
            Ok(value) => Self::Proceed(value),
            Err(reason) => Self::Fail(reason),
        }
    }
}
