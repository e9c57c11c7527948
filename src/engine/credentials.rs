//! Streaming routing locator and tenant token resolution.
//!
//! Resolution is a straight sequence of reads with no retry of its own: any
//! failure is reported as `Fail`, and the orchestrator decides whether to come
//! back with a fresh attempt.

use std::sync::Arc;

use chrono::Utc;

use crate::control_plane::{ApiResponse, DatabaseApi, RoutingCredential, StreamingApi, TransportError};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;

/// Routing locator for the streaming cluster serving a cloud provider and
/// region. Streaming regions carry no separators, unlike database regions.
pub fn pulsar_cluster(cloud_provider: &str, region: &str) -> String {
    let region: String = region.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("pulsar-{cloud_provider}-{region}").to_lowercase()
}

pub struct CredentialResolver {
    databases: Arc<dyn DatabaseApi>,
    streaming: Arc<dyn StreamingApi>,
}

impl CredentialResolver {
    pub fn new(databases: Arc<dyn DatabaseApi>, streaming: Arc<dyn StreamingApi>) -> Self {
        Self {
            databases,
            streaming,
        }
    }

    pub async fn resolve(&self, database_id: &str, tenant: &str) -> RetryOutcome<RoutingCredential> {
        self.try_resolve(database_id, tenant).await.into()
    }

    async fn try_resolve(
        &self,
        database_id: &str,
        tenant: &str,
    ) -> Result<RoutingCredential, ProvisionError> {
        let org = expect_body(self.databases.current_org().await, "fetching current organization")?;

        let db = expect_body(
            self.databases.get_database(database_id).await,
            "fetching database location",
        )?;
        let (cloud_provider, region) = match (db.info.cloud_provider, db.info.region) {
            (Some(provider), Some(region)) => (provider, region),
            _ => {
                return Err(ProvisionError::Credential(format!(
                    "database {database_id} reports no cloud provider or region"
                )))
            }
        };
        let cluster = pulsar_cluster(&cloud_provider, &region);

        let tokens = expect_body(
            self.streaming
                .list_tenant_tokens(tenant, &org.id, &cluster)
                .await,
            "listing tenant tokens",
        )?;
        let token_id = tokens
            .into_iter()
            .next()
            .map(|t| t.tokenid)
            .ok_or_else(|| {
                ProvisionError::Credential(format!(
                    "tenant {tenant} has no tokens on cluster {cluster}"
                ))
            })?;

        let token = expect_body(
            self.streaming
                .get_tenant_token(tenant, &token_id, &org.id, &cluster)
                .await,
            "fetching tenant token",
        )?;
        if token.is_empty() {
            return Err(ProvisionError::Credential(format!(
                "empty token returned for tenant {tenant}"
            )));
        }

        tracing::debug!(tenant, cluster = %cluster, token_id = %token_id, "resolved streaming credential");

        Ok(RoutingCredential {
            cluster,
            token,
            org_id: org.id,
            issued_at: Utc::now(),
        })
    }
}

fn expect_body<T>(
    result: Result<ApiResponse<T>, TransportError>,
    context: &str,
) -> Result<T, ProvisionError> {
    let response = result.map_err(|e| ProvisionError::Credential(format!("{context}: {e}")))?;
    let status = response.status;
    match response.body {
        Some(body) if response.is_success() => Ok(body),
        _ => Err(ProvisionError::Credential(format!(
            "{context}: status {status}: {}",
            response.raw
        ))),
    }
}
