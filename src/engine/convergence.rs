//! Confirms that an accepted mutation is visible in the dependent listing.

use std::sync::Arc;

use crate::control_plane::{ApiResult, DatabaseApi, RoutingCredential, StreamingApi};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;
use crate::retry::{OperationContext, RetryPolicy};

use super::{DependentEntity, EntitySnapshot};

/// Re-lists dependent entities until the mutated one is present or absent,
/// within a fixed attempt budget.
pub struct ConvergencePoller {
    databases: Arc<dyn DatabaseApi>,
    streaming: Arc<dyn StreamingApi>,
    policy: RetryPolicy,
}

impl ConvergencePoller {
    pub fn new(
        databases: Arc<dyn DatabaseApi>,
        streaming: Arc<dyn StreamingApi>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            databases,
            streaming,
            policy,
        }
    }

    pub async fn await_visible(
        &self,
        entity: &DependentEntity,
        credential: Option<&RoutingCredential>,
        ctx: &OperationContext,
    ) -> RetryOutcome<EntitySnapshot> {
        match self.converge(entity, credential, ctx, true).await {
            RetryOutcome::Proceed(Some(snapshot)) => RetryOutcome::Proceed(snapshot),
            RetryOutcome::Proceed(None) => RetryOutcome::Fail(ProvisionError::ConvergenceTimeout {
                entity: entity.to_string(),
                attempts: 0,
            }),
            RetryOutcome::Retry(reason) => RetryOutcome::Retry(reason),
            RetryOutcome::Fail(reason) => RetryOutcome::Fail(reason),
        }
    }

    pub async fn await_absent(
        &self,
        entity: &DependentEntity,
        credential: Option<&RoutingCredential>,
        ctx: &OperationContext,
    ) -> RetryOutcome<()> {
        self.converge(entity, credential, ctx, false)
            .await
            .map(|_| ())
    }

    async fn converge(
        &self,
        entity: &DependentEntity,
        credential: Option<&RoutingCredential>,
        ctx: &OperationContext,
        want_present: bool,
    ) -> RetryOutcome<Option<EntitySnapshot>> {
        let mut attempts = 0u32;
        let mut last_reason: Option<ProvisionError> = None;

        loop {
            attempts += 1;
            let observed = match ctx.run(self.observe(entity, credential)).await {
                Ok(observed) => observed,
                Err(interrupt) => {
                    return RetryOutcome::Fail(interrupt.into_error(last_reason.as_ref(), true))
                }
            };

            match observed {
                RetryOutcome::Proceed(found) if found.is_some() == want_present => {
                    tracing::debug!(entity = %entity, attempts, want_present, "listing converged");
                    return RetryOutcome::Proceed(found);
                }
                RetryOutcome::Proceed(_) => last_reason = None,
                RetryOutcome::Retry(reason) => last_reason = Some(reason),
                RetryOutcome::Fail(reason) => return RetryOutcome::Fail(reason),
            }

            if !self.policy.allows(attempts) {
                tracing::warn!(entity = %entity, attempts, want_present, "listing did not converge");
                return RetryOutcome::Fail(ProvisionError::ConvergenceTimeout {
                    entity: entity.to_string(),
                    attempts,
                });
            }

            let delay = self.policy.delay_after(attempts);
            tracing::debug!(
                entity = %entity,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "waiting for listing to converge"
            );
            if let Err(interrupt) = ctx.sleep(delay).await {
                return RetryOutcome::Fail(interrupt.into_error(last_reason.as_ref(), true));
            }
        }
    }

    /// One listing read: `Proceed(Some)` when the entity is listed,
    /// `Proceed(None)` when it is not.
    pub async fn observe(
        &self,
        entity: &DependentEntity,
        credential: Option<&RoutingCredential>,
    ) -> RetryOutcome<Option<EntitySnapshot>> {
        match entity {
            DependentEntity::Keyspace(id) => {
                let result = self.databases.list_keyspaces(&id.database_id).await;
                classify_listing(result, "listing keyspaces").map(|names| {
                    names
                        .iter()
                        .any(|name| *name == id.name)
                        .then_some(EntitySnapshot::Keyspace)
                })
            }
            DependentEntity::Cdc(target) => {
                let Some(credential) = credential else {
                    return RetryOutcome::Fail(ProvisionError::Credential(format!(
                        "no routing credential resolved for {entity}"
                    )));
                };
                let result = self.streaming.list_cdc(&target.id.tenant, credential).await;
                classify_listing(result, "listing cdc").map(|entries| {
                    // Pick the entry matching the whole key, not merely the first.
                    entries
                        .into_iter()
                        .find(|e| e.matches(&target.id.database_id, &target.id.keyspace, &target.id.table))
                        .map(|e| EntitySnapshot::Cdc {
                            connector_status: e.connector_status,
                            data_topic: e.data_topic,
                            database_name: e.database_name,
                        })
                })
            }
        }
    }
}

fn classify_listing<T>(result: ApiResult<Vec<T>>, context: &str) -> RetryOutcome<Vec<T>> {
    let response = match result {
        Ok(response) => response,
        Err(e) => return RetryOutcome::Retry(ProvisionError::transport(context, e)),
    };
    if response.status >= 500 {
        return RetryOutcome::Retry(ProvisionError::transport(
            context,
            format!("status {}: {}", response.status, response.raw),
        ));
    }
    match response.body {
        Some(entries) if response.is_success() => RetryOutcome::Proceed(entries),
        _ => RetryOutcome::Fail(ProvisionError::UnexpectedResponseShape {
            context: context.to_string(),
            status: response.status,
            body: response.raw,
        }),
    }
}
