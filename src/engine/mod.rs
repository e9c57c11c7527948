//! Reconciliation engine
//!
//! Leaf components classify one remote interaction each into a
//! [`RetryOutcome`](crate::outcome::RetryOutcome); the [`RetryOrchestrator`]
//! sequences them and owns every retry decision.

pub mod convergence;
pub mod credentials;
pub mod mutation;
pub mod orchestrator;
pub mod status_poller;

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::identity::{CdcId, KeyspaceId};

pub use convergence::ConvergencePoller;
pub use credentials::{pulsar_cluster, CredentialResolver};
pub use mutation::{classify_mutation_response, MutationExecutor, MutationOp};
pub use orchestrator::{OperationReport, Phase, RetryOrchestrator};
pub use status_poller::{classify_database_response, ParentStatusSnapshot, StatusPoller};

// ---------------------------------------------------------------------------
// AccessGuard
// ---------------------------------------------------------------------------

/// Serialises read-then-write sequences against the control plane.
///
/// One guard is shared by every orchestrator in the process; clones refer to
/// the same lock.
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    lock: Arc<Mutex<()>>,
}

impl AccessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.lock.clone().lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// Dependent entities
// ---------------------------------------------------------------------------

/// CDC pipeline to provision, with the request-only fields that are not part
/// of its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdcTarget {
    pub id: CdcId,
    pub database_name: String,
    pub topic_partitions: u32,
}

/// The sub-resource a mutation creates or removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentEntity {
    Keyspace(KeyspaceId),
    Cdc(CdcTarget),
}

impl DependentEntity {
    pub fn database_id(&self) -> &str {
        match self {
            Self::Keyspace(id) => &id.database_id,
            Self::Cdc(target) => &target.id.database_id,
        }
    }

    /// Streaming tenant, for entities reached through a routing credential.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            Self::Keyspace(_) => None,
            Self::Cdc(target) => Some(&target.id.tenant),
        }
    }

    pub fn needs_credential(&self) -> bool {
        self.tenant().is_some()
    }

    pub fn identity(&self) -> String {
        match self {
            Self::Keyspace(id) => id.encode(),
            Self::Cdc(target) => target.id.encode(),
        }
    }
}

impl fmt::Display for DependentEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyspace(id) => write!(f, "{id}"),
            Self::Cdc(target) => write!(f, "{}", target.id),
        }
    }
}

/// Observable fields captured once an entity shows up in its listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySnapshot {
    Keyspace,
    Cdc {
        connector_status: String,
        data_topic: String,
        database_name: String,
    },
}
