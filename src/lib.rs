//! astra-provision - keyspace and CDC provisioning against the Astra control plane
//!
//! Dependent entities (a keyspace, a CDC pipeline) can only be mutated while
//! their parent database is active. Every create or delete is driven by the
//! [`RetryOrchestrator`](engine::RetryOrchestrator):
//! parent status -> streaming credential -> mutation -> convergence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use astra_provision::config::ProviderConfig;
//! use astra_provision::engine::AccessGuard;
//! use astra_provision::resources::{KeyspaceState, Provisioner};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = ProviderConfig::from_env()?;
//! let provisioner = Provisioner::from_config(&config, AccessGuard::new())?;
//!
//! let mut keyspace = KeyspaceState::new("8c2d4ef0-7f5e-4c52-9d1a-3b1f1e7c9a01", "orders");
//! provisioner
//!     .create_keyspace(&mut keyspace, &provisioner.context())
//!     .await?;
//! assert!(keyspace.id.is_some());
//! # Ok(())
//! # }
//! ```

// Error taxonomy and per-step outcome
pub mod error;
pub mod outcome;

// Retry policies, deadlines and cancellation
pub mod retry;

// Identity encoding and input validation
pub mod identity;
pub mod validate;

pub mod config;

// Remote interfaces and the HTTP client
pub mod control_plane;

// State machine components
pub mod engine;

// Keyspace and CDC resource operations
pub mod resources;

pub mod telemetry;

pub use config::ProviderConfig;
pub use engine::{AccessGuard, DependentEntity, OperationReport, RetryOrchestrator};
pub use error::ProvisionError;
pub use identity::{CdcId, KeyspaceId};
pub use outcome::RetryOutcome;
pub use resources::{CdcState, KeyspaceState, Provisioner};
pub use retry::{OperationContext, RetryPolicy};
