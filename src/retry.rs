//! Retry policies and the per-operation deadline/cancellation context.
//!
//! Every bounded-retry component takes a [`RetryPolicy`] instead of sleeping
//! for a hard-coded duration, so tests can substitute
//! [`RetryPolicy::immediate`]. Every suspension point goes through an
//! [`OperationContext`], which aborts promptly once the caller's deadline
//! passes or the cancellation signal fires.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ProvisionError;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Attempt ceiling plus inter-attempt delay.
///
/// `max_attempts: None` means the loop is bounded only by the operation
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    /// Cap for exponential growth.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay_ms: delay.as_millis() as u64,
            backoff: Backoff::Fixed,
            max_delay_ms: default_max_delay_ms(),
        }
    }

    /// Deadline-bounded polling with a fixed delay.
    pub fn until_deadline(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay_ms: delay.as_millis() as u64,
            backoff: Backoff::Fixed,
            max_delay_ms: default_max_delay_ms(),
        }
    }

    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub fn exponential(mut self, max_delay: Duration) -> Self {
        self.backoff = Backoff::Exponential;
        self.max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    /// Whether another attempt may start after `attempts_made` attempts.
    pub fn allows(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }

    /// Delay before the retry that follows attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.delay_ms,
            Backoff::Exponential => {
                let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
                self.delay_ms.saturating_mul(factor).min(self.max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

/// Why a suspension point gave up early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Interrupt {
    /// Convert into the terminal error, carrying the last retry reason seen.
    pub fn into_error(
        self,
        last_reason: Option<&ProvisionError>,
        mutation_accepted: bool,
    ) -> ProvisionError {
        match self {
            Interrupt::Cancelled => ProvisionError::Cancelled { mutation_accepted },
            Interrupt::DeadlineExceeded => ProvisionError::DeadlineExceeded {
                last_reason: last_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "operation deadline reached".to_string()),
                mutation_accepted,
            },
        }
    }
}

/// Deadline and cancellation signal for a single create/read/delete run.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort once the watched value becomes `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    pub fn checkpoint(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the deadline or cancellation fires
    /// first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.checkpoint()?;
        let mut cancel = self.cancel.clone();
        tokio::select! {
            output = fut => Ok(output),
            _ = wait_cancelled(cancel.as_mut()) => Err(Interrupt::Cancelled),
            _ = wait_deadline(self.deadline) => Err(Interrupt::DeadlineExceeded),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.run(tokio::time::sleep(duration)).await
    }
}

async fn wait_cancelled(cancel: Option<&mut watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => {
            // A dropped sender can never cancel.
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy_bounds_attempts() {
        let p = RetryPolicy::fixed(3, Duration::from_millis(500));
        assert!(p.allows(0));
        assert!(p.allows(2));
        assert!(!p.allows(3));
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(5), Duration::from_millis(500));
    }

    #[test]
    fn test_deadline_policy_never_exhausts() {
        let p = RetryPolicy::until_deadline(Duration::from_secs(10));
        assert!(p.allows(u32::MAX - 1));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let p = RetryPolicy::fixed(10, Duration::from_millis(250))
            .exponential(Duration::from_millis(1_000));
        assert_eq!(p.delay_after(1), Duration::from_millis(250));
        assert_eq!(p.delay_after(2), Duration::from_millis(500));
        assert_eq!(p.delay_after(3), Duration::from_millis(1_000));
        assert_eq!(p.delay_after(9), Duration::from_millis(1_000));
    }

    #[test]
    fn test_policy_from_yaml_defaults() {
        let p: RetryPolicy = serde_yaml::from_str("delay_ms: 20000\nmax_attempts: 7\n").unwrap();
        assert_eq!(p, RetryPolicy::fixed(7, Duration::from_secs(20)));
    }

    #[tokio::test]
    async fn test_sleep_aborts_at_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let result = ctx.sleep(Duration::from_secs(30)).await;
        assert_eq!(result, Err(Interrupt::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_aborts_on_cancel() {
        let (tx, rx) = watch::channel(false);
        let ctx = OperationContext::new().with_cancellation(rx);
        let sleeper = tokio::spawn(async move { ctx.sleep(Duration::from_secs(30)).await });
        tx.send(true).unwrap();
        assert_eq!(sleeper.await.unwrap(), Err(Interrupt::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let ctx = OperationContext::new().with_cancellation(rx);
        assert_eq!(ctx.sleep(Duration::from_millis(1)).await, Ok(()));
    }

    #[test]
    fn test_deadline_interrupt_carries_last_reason() {
        let reason = ProvisionError::ParentNotReady {
            database_id: "db-1".to_string(),
            status: "INITIALIZING".to_string(),
        };
        let err = Interrupt::DeadlineExceeded.into_error(Some(&reason), false);
        assert!(err.to_string().contains("INITIALIZING"));
        assert!(!err.possibly_applied());
    }
}
