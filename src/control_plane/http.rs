//! reqwest-backed control plane client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::types::{CdcEntry, CdcRequest, Database, Organization, RoutingCredential, TenantToken};
use super::{ApiResponse, ApiResult, DatabaseApi, StreamingApi, TransportError};
use crate::config::ProviderConfig;

const HEADER_CURRENT_ORG: &str = "X-DataStax-Current-Org";
const HEADER_PULSAR_CLUSTER: &str = "X-DataStax-Pulsar-Cluster";

/// HTTP client for the DevOps and streaming APIs.
pub struct HttpControlPlane {
    client: Client,
    api_url: String,
    streaming_api_url: String,
    token: String,
}

impl HttpControlPlane {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("astra-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            streaming_api_url: config.streaming_api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn database_url(&self, database_id: &str) -> String {
        format!("{}/v2/databases/{}", self.api_url, database_id)
    }

    fn tokens_url(&self, tenant: &str) -> String {
        format!(
            "{}/v2/streaming/tenants/{}/tokens",
            self.streaming_api_url, tenant
        )
    }

    fn cdc_url(&self, tenant: &str) -> String {
        format!("{}/v3/astra/tenants/{}/cdc", self.streaming_api_url, tenant)
    }

    /// Send and read the body; decode JSON only for 2xx responses.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> ApiResult<T> {
        let (status, raw) = send(request, context).await?;
        let body = if (200..300).contains(&status) {
            match serde_json::from_str(&raw) {
                Ok(body) => Some(body),
                Err(e) => {
                    tracing::warn!(status, error = %e, "{context}: response body did not decode");
                    None
                }
            }
        } else {
            None
        };
        Ok(ApiResponse { status, body, raw })
    }

    /// Send a mutation whose success body carries nothing we need.
    async fn send_unit(&self, request: RequestBuilder, context: &str) -> ApiResult<()> {
        let (status, raw) = send(request, context).await?;
        let body = (200..300).contains(&status).then_some(());
        Ok(ApiResponse { status, body, raw })
    }

    fn tenant_token_request(&self, request: RequestBuilder, org_id: &str, cluster: &str) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(HEADER_CURRENT_ORG, org_id)
            .header(HEADER_PULSAR_CLUSTER, cluster)
    }

    fn cdc_request(&self, request: RequestBuilder, credential: &RoutingCredential) -> RequestBuilder {
        request
            .bearer_auth(&credential.token)
            .header(HEADER_PULSAR_CLUSTER, &credential.cluster)
    }
}

async fn send(request: RequestBuilder, context: &str) -> Result<(u16, String), TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::new(context, e))?;
    let status = response.status().as_u16();
    let raw = response
        .text()
        .await
        .map_err(|e| TransportError::new(context, e))?;
    Ok((status, raw))
}

#[async_trait]
impl DatabaseApi for HttpControlPlane {
    async fn get_database(&self, database_id: &str) -> ApiResult<Database> {
        let request = self
            .client
            .get(self.database_url(database_id))
            .bearer_auth(&self.token);
        self.send_json(request, "fetching database").await
    }

    async fn list_keyspaces(&self, database_id: &str) -> ApiResult<Vec<String>> {
        Ok(self
            .get_database(database_id)
            .await?
            .map(|db| db.info.keyspaces))
    }

    async fn add_keyspace(&self, database_id: &str, keyspace: &str) -> ApiResult<()> {
        let url = format!("{}/keyspaces/{}", self.database_url(database_id), keyspace);
        let request = self.client.post(url).bearer_auth(&self.token);
        self.send_unit(request, "adding keyspace").await
    }

    async fn drop_keyspace(&self, database_id: &str, keyspace: &str) -> ApiResult<()> {
        let url = format!("{}/keyspaces/{}", self.database_url(database_id), keyspace);
        let request = self.client.delete(url).bearer_auth(&self.token);
        self.send_unit(request, "dropping keyspace").await
    }

    async fn current_org(&self) -> ApiResult<Organization> {
        let request = self
            .client
            .get(format!("{}/v2/currentOrg", self.api_url))
            .bearer_auth(&self.token);
        self.send_json(request, "fetching current organization").await
    }
}

#[async_trait]
impl StreamingApi for HttpControlPlane {
    async fn list_tenant_tokens(
        &self,
        tenant: &str,
        org_id: &str,
        cluster: &str,
    ) -> ApiResult<Vec<TenantToken>> {
        let request =
            self.tenant_token_request(self.client.get(self.tokens_url(tenant)), org_id, cluster);
        self.send_json(request, "listing tenant tokens").await
    }

    async fn get_tenant_token(
        &self,
        tenant: &str,
        token_id: &str,
        org_id: &str,
        cluster: &str,
    ) -> ApiResult<String> {
        let url = format!("{}/{}", self.tokens_url(tenant), token_id);
        let request = self.tenant_token_request(self.client.get(url), org_id, cluster);
        let (status, raw) = send(request, "fetching tenant token").await?;
        let body = (200..300)
            .contains(&status)
            .then(|| raw.trim().to_string());
        Ok(ApiResponse { status, body, raw })
    }

    async fn enable_cdc(
        &self,
        tenant: &str,
        request: &CdcRequest,
        credential: &RoutingCredential,
    ) -> ApiResult<()> {
        let builder = self
            .cdc_request(self.client.post(self.cdc_url(tenant)), credential)
            .json(request);
        self.send_unit(builder, "enabling cdc").await
    }

    async fn delete_cdc(
        &self,
        tenant: &str,
        request: &CdcRequest,
        credential: &RoutingCredential,
    ) -> ApiResult<()> {
        let builder = self
            .cdc_request(self.client.delete(self.cdc_url(tenant)), credential)
            .json(request);
        self.send_unit(builder, "deleting cdc").await
    }

    async fn list_cdc(
        &self,
        tenant: &str,
        credential: &RoutingCredential,
    ) -> ApiResult<Vec<CdcEntry>> {
        let request = self.cdc_request(self.client.get(self.cdc_url(tenant)), credential);
        self.send_json(request, "listing cdc").await
    }
}
