//! Keyspace and CDC resources
//!
//! Each resource keeps its attributes in a plain state struct (the persisted
//! identity plus named attributes). Create and delete go through the
//! [`RetryOrchestrator`]; read and import decode the identity and consult the
//! listing directly.

pub mod cdc;
pub mod keyspace;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::ProviderConfig;
use crate::control_plane::{DatabaseApi, HttpControlPlane, StreamingApi};
use crate::engine::{AccessGuard, RetryOrchestrator};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;
use crate::retry::OperationContext;

pub use cdc::CdcState;
pub use keyspace::KeyspaceState;

/// Entry point for provisioning keyspaces and CDC pipelines.
pub struct Provisioner {
    orchestrator: RetryOrchestrator,
    operation_timeout: Duration,
}

impl Provisioner {
    /// Provisioner talking to the control plane over HTTP.
    pub fn from_config(config: &ProviderConfig, guard: AccessGuard) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpControlPlane::new(config)?);
        Ok(Self::with_apis(client.clone(), client, guard, config))
    }

    pub fn with_apis(
        databases: Arc<dyn DatabaseApi>,
        streaming: Arc<dyn StreamingApi>,
        guard: AccessGuard,
        config: &ProviderConfig,
    ) -> Self {
        Self {
            orchestrator: RetryOrchestrator::new(
                databases,
                streaming,
                guard,
                config.status_retry.clone(),
                config.convergence_retry.clone(),
                config.credential_retry.clone(),
            ),
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Context bounded by the configured operation timeout.
    pub fn context(&self) -> OperationContext {
        OperationContext::new().with_timeout(self.operation_timeout)
    }

    pub fn orchestrator(&self) -> &RetryOrchestrator {
        &self.orchestrator
    }
}

/// Run a single read step under the context, flattening interruption and
/// `Retry` into an error: reads have no retry loop.
async fn read_step<T>(
    ctx: &OperationContext,
    step: impl std::future::Future<Output = RetryOutcome<T>>,
) -> Result<T, ProvisionError> {
    ctx.run(step)
        .await
        .map_err(|interrupt| interrupt.into_error(None, false))?
        .into_result()
}
