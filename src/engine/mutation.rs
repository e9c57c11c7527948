//! One-shot create/delete mutations against the dependent subsystem.

use std::fmt;
use std::sync::Arc;

use crate::control_plane::{ApiResult, CdcRequest, DatabaseApi, RoutingCredential, StreamingApi};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;

use super::DependentEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Delete,
}

impl MutationOp {
    fn context(self, entity: &DependentEntity) -> &'static str {
        match (self, entity) {
            (Self::Create, DependentEntity::Keyspace(_)) => "adding keyspace to database",
            (Self::Delete, DependentEntity::Keyspace(_)) => "dropping keyspace from database",
            (Self::Create, DependentEntity::Cdc(_)) => "enabling cdc",
            (Self::Delete, DependentEntity::Cdc(_)) => "deleting cdc",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Classify a mutation response.
///
/// Transport failures are terminal here: state must be re-read before
/// anything is resent. 409 retries. 401 fails as `PermissionDenied`, flagged
/// stale when the call was authorised by a routing credential that can be
/// refreshed. A 404 on delete means the entity is already gone.
pub fn classify_mutation_response(
    op: MutationOp,
    entity: &DependentEntity,
    result: ApiResult<()>,
) -> RetryOutcome<()> {
    let context = op.context(entity);
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            return RetryOutcome::Fail(ProvisionError::transport(
                format!("{context} (not retrying)"),
                e,
            ))
        }
    };

    match response.status {
        200..=299 => RetryOutcome::Proceed(()),
        404 if op == MutationOp::Delete => {
            tracing::info!(entity = %entity, "already absent, nothing to delete");
            RetryOutcome::Proceed(())
        }
        409 => RetryOutcome::Retry(ProvisionError::Conflict {
            context: context.to_string(),
            body: response.raw,
        }),
        401 => {
            let (detail, stale_credential) = match (op, entity) {
                (MutationOp::Create, DependentEntity::Keyspace(_)) => (
                    "insufficient permissions, role missing 'db-keyspace-create'".to_string(),
                    false,
                ),
                (MutationOp::Delete, DependentEntity::Keyspace(_)) => (
                    "insufficient permissions, role missing 'db-keyspace-drop'".to_string(),
                    false,
                ),
                (_, DependentEntity::Cdc(_)) => (
                    format!("streaming token rejected: {}", response.raw),
                    true,
                ),
            };
            RetryOutcome::Fail(ProvisionError::PermissionDenied {
                context: context.to_string(),
                detail,
                stale_credential,
            })
        }
        status if status >= 400 => RetryOutcome::Fail(ProvisionError::Rejected {
            context: context.to_string(),
            status,
            body: response.raw,
        }),
        status => RetryOutcome::Fail(ProvisionError::UnexpectedResponseShape {
            context: context.to_string(),
            status,
            body: response.raw,
        }),
    }
}

pub struct MutationExecutor {
    databases: Arc<dyn DatabaseApi>,
    streaming: Arc<dyn StreamingApi>,
}

impl MutationExecutor {
    pub fn new(databases: Arc<dyn DatabaseApi>, streaming: Arc<dyn StreamingApi>) -> Self {
        Self {
            databases,
            streaming,
        }
    }

    pub async fn apply(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        credential: Option<&RoutingCredential>,
    ) -> RetryOutcome<()> {
        let result = match entity {
            DependentEntity::Keyspace(id) => match op {
                MutationOp::Create => self.databases.add_keyspace(&id.database_id, &id.name).await,
                MutationOp::Delete => self.databases.drop_keyspace(&id.database_id, &id.name).await,
            },
            DependentEntity::Cdc(target) => {
                let Some(credential) = credential else {
                    return RetryOutcome::Fail(ProvisionError::Credential(format!(
                        "no routing credential resolved for {entity}"
                    )));
                };
                let request = CdcRequest {
                    database_id: target.id.database_id.clone(),
                    database_name: target.database_name.clone(),
                    keyspace: target.id.keyspace.clone(),
                    org_id: credential.org_id.clone(),
                    table_name: target.id.table.clone(),
                    topic_partitions: target.topic_partitions,
                };
                match op {
                    MutationOp::Create => {
                        self.streaming
                            .enable_cdc(&target.id.tenant, &request, credential)
                            .await
                    }
                    MutationOp::Delete => {
                        self.streaming
                            .delete_cdc(&target.id.tenant, &request, credential)
                            .await
                    }
                }
            }
        };
        classify_mutation_response(op, entity, result)
    }
}
