//! Error taxonomy for provisioning operations
//!
//! Every engine component reports its outcome as a [`RetryOutcome`] whose
//! `Retry`/`Fail` arms carry one of these variants. The orchestrator turns the
//! final `Fail` into the error returned to the caller.
//!
//! [`RetryOutcome`]: crate::outcome::RetryOutcome

use thiserror::Error;

/// Main error type for keyspace and CDC provisioning
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("transport error while {context}: {message}")]
    TransientTransport { context: String, message: String },

    #[error("database {database_id} failed to reach active status: status={status}")]
    ParentTerminal { database_id: String, status: String },

    #[error("expected database {database_id} to be active but is {status}")]
    ParentNotReady { database_id: String, status: String },

    #[error("unexpected response {context} (status {status}): {body}")]
    UnexpectedResponseShape {
        context: String,
        status: u16,
        body: String,
    },

    #[error("concurrent modification while {context} (retrying): {body}")]
    Conflict { context: String, body: String },

    #[error("permission denied while {context}: {detail}")]
    PermissionDenied {
        context: String,
        detail: String,
        stale_credential: bool,
    },

    #[error("{context} rejected (status {status}, not retrying): {body}")]
    Rejected {
        context: String,
        status: u16,
        body: String,
    },

    #[error("could not resolve streaming credential: {0}")]
    Credential(String),

    #[error("{entity} not observed after {attempts} attempts; the change may still apply, refresh to confirm")]
    ConvergenceTimeout { entity: String, attempts: u32 },

    #[error("{entity} was accepted but could not be confirmed: {reason}")]
    Unconfirmed {
        entity: String,
        reason: Box<ProvisionError>,
    },

    #[error("invalid {kind} id format '{id}': expected {expected}")]
    StructuralDecode {
        kind: &'static str,
        id: String,
        expected: &'static str,
    },

    #[error("operation cancelled")]
    Cancelled { mutation_accepted: bool },

    #[error("timeout while waiting: {last_reason}")]
    DeadlineExceeded {
        last_reason: String,
        mutation_accepted: bool,
    },

    #[error("invalid value for '{field}': {message}")]
    Validation { field: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    pub fn transport(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::TransientTransport {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Whether the remote mutation may have taken effect even though the
    /// operation did not complete. Callers should re-read rather than assume
    /// nothing happened.
    pub fn possibly_applied(&self) -> bool {
        match self {
            Self::ConvergenceTimeout { .. } | Self::Unconfirmed { .. } => true,
            Self::Cancelled { mutation_accepted } => *mutation_accepted,
            Self::DeadlineExceeded {
                mutation_accepted, ..
            } => *mutation_accepted,
            _ => false,
        }
    }

    /// The credential-stale variant of `PermissionDenied`, which the
    /// orchestrator answers with a bounded credential refresh.
    pub fn is_stale_credential(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied {
                stale_credential: true,
                ..
            }
        )
    }
}
