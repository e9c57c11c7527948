//! Scripted in-memory control plane for integration tests.
//!
//! Parent statuses and mutation status codes are consumed from queues; the
//! last queued status sticks. Accepted mutations change the keyspace and CDC
//! listings unless listing is suppressed. Every call is recorded.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use astra_provision::control_plane::{
    ApiResponse, ApiResult, CdcEntry, CdcRequest, Database, DatabaseApi, DatabaseInfo,
    DatabaseStatus, Organization, RoutingCredential, StreamingApi, TenantToken, TransportError,
};
use astra_provision::engine::AccessGuard;
use astra_provision::resources::Provisioner;
use astra_provision::{ProviderConfig, RetryOrchestrator, RetryPolicy};

pub const DATABASE_ID: &str = "8c2d4ef0-7f5e-4c52-9d1a-3b1f1e7c9a01";
pub const TENANT: &str = "shop-events";

/// Call counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub database_reads: u32,
    pub mutations: u32,
    pub credential_resolutions: u32,
    pub listings: u32,
}

#[derive(Default)]
struct Script {
    statuses: VecDeque<DatabaseStatus>,
    mutation_statuses: VecDeque<u16>,
    default_mutation_status: Option<u16>,
    keyspaces: Vec<String>,
    cdc: Vec<CdcEntry>,
    hide_mutations: bool,
    listing_status: Option<u16>,
    tokens: Option<Vec<String>>,
    token_list_status: Option<u16>,
    token_fetch_unreachable: bool,
    calls: Calls,
    events: Vec<String>,
}

#[derive(Default)]
pub struct FakeControlPlane {
    script: Mutex<Script>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent statuses in order; the last one repeats. Defaults to ACTIVE.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = DatabaseStatus>) -> Self {
        self.lock().statuses = statuses.into_iter().collect();
        self
    }

    /// Status codes for the next mutation calls, in order.
    pub fn with_mutation_responses(self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.lock().mutation_statuses = codes.into_iter().collect();
        self
    }

    /// Status code for every mutation once the scripted queue is drained.
    pub fn with_default_mutation_status(self, code: u16) -> Self {
        self.lock().default_mutation_status = Some(code);
        self
    }

    pub fn with_keyspaces(self, names: &[&str]) -> Self {
        self.lock().keyspaces = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_cdc_entries(self, entries: Vec<CdcEntry>) -> Self {
        self.lock().cdc = entries;
        self
    }

    /// Accept mutations without ever reflecting them in a listing.
    pub fn never_lists_mutations(self) -> Self {
        self.lock().hide_mutations = true;
        self
    }

    /// Every listing answers with this error status.
    pub fn with_listing_status(self, code: u16) -> Self {
        self.lock().listing_status = Some(code);
        self
    }

    /// Token ids listed for the tenant. Defaults to `["tok-1"]`.
    pub fn with_tenant_tokens(self, ids: &[&str]) -> Self {
        self.lock().tokens = Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    /// The token listing answers with this error status.
    pub fn with_token_list_status(self, code: u16) -> Self {
        self.lock().token_list_status = Some(code);
        self
    }

    /// Fetching a token fails before any response arrives.
    pub fn with_unreachable_token_fetch(self) -> Self {
        self.lock().token_fetch_unreachable = true;
        self
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    /// Ordered record of status reads and mutations.
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn keyspaces(&self) -> Vec<String> {
        self.lock().keyspaces.clone()
    }

    pub fn cdc_entries(&self) -> Vec<CdcEntry> {
        self.lock().cdc.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("fake control plane poisoned")
    }

    /// Next mutation status; `present` picks the default for an unscripted call.
    fn next_mutation(&self, event: String, present: bool, create: bool) -> u16 {
        let mut script = self.lock();
        script.calls.mutations += 1;
        script.events.push(event);
        script
            .mutation_statuses
            .pop_front()
            .or(script.default_mutation_status)
            .unwrap_or(match (create, present) {
                (true, _) => 201,
                (false, true) => 202,
                (false, false) => 404,
            })
    }
}

pub fn cdc_entry(database_id: &str, keyspace: &str, table: &str) -> CdcEntry {
    CdcEntry {
        org_id: "org-1".to_string(),
        tenant: TENANT.to_string(),
        database_id: database_id.to_string(),
        database_name: "shop".to_string(),
        keyspace: keyspace.to_string(),
        database_table: table.to_string(),
        connector_status: "Running".to_string(),
        data_topic: format!("persistent://{TENANT}/astracdc/data-{database_id}-{keyspace}.{table}"),
        ..CdcEntry::default()
    }
}

fn response<T>(status: u16, body: T) -> ApiResult<T> {
    if (200..300).contains(&status) {
        Ok(ApiResponse::ok(status, body))
    } else {
        Ok(ApiResponse::error(status, format!("scripted status {status}")))
    }
}

#[async_trait]
impl DatabaseApi for FakeControlPlane {
    async fn get_database(&self, database_id: &str) -> ApiResult<Database> {
        let database = {
            let mut script = self.lock();
            script.calls.database_reads += 1;
            script.events.push(format!("get_database:{database_id}"));
            let next = if script.statuses.len() > 1 {
                script.statuses.pop_front()
            } else {
                script.statuses.front().cloned()
            };
            let status = next.unwrap_or(DatabaseStatus::Active);
            Database {
                id: database_id.to_string(),
                status,
                info: DatabaseInfo {
                    name: Some("shop".to_string()),
                    cloud_provider: Some("GCP".to_string()),
                    region: Some("us-east1".to_string()),
                    keyspaces: script.keyspaces.clone(),
                },
            }
        };
        // Give concurrent runs a chance to interleave.
        tokio::task::yield_now().await;
        Ok(ApiResponse::ok(200, database))
    }

    async fn list_keyspaces(&self, _database_id: &str) -> ApiResult<Vec<String>> {
        let mut script = self.lock();
        script.calls.listings += 1;
        if let Some(code) = script.listing_status {
            return Ok(ApiResponse::error(code, "forbidden"));
        }
        Ok(ApiResponse::ok(200, script.keyspaces.clone()))
    }

    async fn add_keyspace(&self, _database_id: &str, keyspace: &str) -> ApiResult<()> {
        let present = self.lock().keyspaces.iter().any(|k| k == keyspace);
        let status = self.next_mutation(format!("add_keyspace:{keyspace}"), present, true);
        let mut script = self.lock();
        if (200..300).contains(&status) && !script.hide_mutations && !present {
            script.keyspaces.push(keyspace.to_string());
        }
        response(status, ())
    }

    async fn drop_keyspace(&self, _database_id: &str, keyspace: &str) -> ApiResult<()> {
        let present = self.lock().keyspaces.iter().any(|k| k == keyspace);
        let status = self.next_mutation(format!("drop_keyspace:{keyspace}"), present, false);
        let mut script = self.lock();
        if (200..300).contains(&status) && !script.hide_mutations {
            script.keyspaces.retain(|k| k != keyspace);
        }
        response(status, ())
    }

    async fn current_org(&self) -> ApiResult<Organization> {
        Ok(ApiResponse::ok(200, Organization { id: "org-1".to_string() }))
    }
}

#[async_trait]
impl StreamingApi for FakeControlPlane {
    async fn list_tenant_tokens(
        &self,
        _tenant: &str,
        _org_id: &str,
        _cluster: &str,
    ) -> ApiResult<Vec<TenantToken>> {
        let mut script = self.lock();
        script.calls.credential_resolutions += 1;
        if let Some(code) = script.token_list_status {
            return Ok(ApiResponse::error(code, "token listing refused"));
        }
        let ids = script
            .tokens
            .clone()
            .unwrap_or_else(|| vec!["tok-1".to_string()]);
        let tokens = ids
            .into_iter()
            .map(|tokenid| TenantToken {
                tokenid,
                iat: None,
                iss: None,
                sub: None,
            })
            .collect();
        Ok(ApiResponse::ok(200, tokens))
    }

    async fn get_tenant_token(
        &self,
        _tenant: &str,
        token_id: &str,
        _org_id: &str,
        _cluster: &str,
    ) -> ApiResult<String> {
        if self.lock().token_fetch_unreachable {
            return Err(TransportError::new("fetching tenant token", "connection reset"));
        }
        Ok(ApiResponse::ok(200, format!("jwt-{token_id}")))
    }

    async fn enable_cdc(
        &self,
        tenant: &str,
        request: &CdcRequest,
        _credential: &RoutingCredential,
    ) -> ApiResult<()> {
        let status = self.next_mutation(format!("enable_cdc:{}", request.table_name), false, true);
        let mut script = self.lock();
        if (200..300).contains(&status) && !script.hide_mutations {
            let mut entry = cdc_entry(&request.database_id, &request.keyspace, &request.table_name);
            entry.tenant = tenant.to_string();
            entry.database_name = request.database_name.clone();
            script.cdc.push(entry);
        }
        response(status, ())
    }

    async fn delete_cdc(
        &self,
        _tenant: &str,
        request: &CdcRequest,
        _credential: &RoutingCredential,
    ) -> ApiResult<()> {
        let present = self.lock().cdc.iter().any(|e| {
            e.matches(&request.database_id, &request.keyspace, &request.table_name)
        });
        let status =
            self.next_mutation(format!("delete_cdc:{}", request.table_name), present, false);
        let mut script = self.lock();
        if (200..300).contains(&status) && !script.hide_mutations {
            script.cdc.retain(|e| {
                !e.matches(&request.database_id, &request.keyspace, &request.table_name)
            });
        }
        response(status, ())
    }

    async fn list_cdc(
        &self,
        _tenant: &str,
        _credential: &RoutingCredential,
    ) -> ApiResult<Vec<CdcEntry>> {
        let mut script = self.lock();
        script.calls.listings += 1;
        if let Some(code) = script.listing_status {
            return Ok(ApiResponse::error(code, "forbidden"));
        }
        Ok(ApiResponse::ok(200, script.cdc.clone()))
    }
}

/// Zero-delay policies with small ceilings.
pub fn test_config() -> ProviderConfig {
    let mut config = ProviderConfig::new("test-token");
    config.status_retry = RetryPolicy::immediate(20);
    config.convergence_retry = RetryPolicy::immediate(3);
    config.credential_retry = RetryPolicy::immediate(5);
    config
}

pub fn orchestrator(fake: &Arc<FakeControlPlane>, guard: AccessGuard) -> RetryOrchestrator {
    orchestrator_with(fake, guard, test_config())
}

pub fn orchestrator_with(
    fake: &Arc<FakeControlPlane>,
    guard: AccessGuard,
    config: ProviderConfig,
) -> RetryOrchestrator {
    RetryOrchestrator::new(
        fake.clone(),
        fake.clone(),
        guard,
        config.status_retry,
        config.convergence_retry,
        config.credential_retry,
    )
}

pub fn provisioner(fake: &Arc<FakeControlPlane>) -> Provisioner {
    Provisioner::with_apis(fake.clone(), fake.clone(), AccessGuard::new(), &test_config())
}
