//! Typed wire records for the control plane endpoints.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Lifecycle status reported for a database.
///
/// Unrecognised values decode to `Other` so that a status added remotely is
/// treated as transient rather than as a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatabaseStatus {
    Active,
    Pending,
    Preparing,
    Prepared,
    Initializing,
    Parking,
    Parked,
    Unparking,
    Terminating,
    Terminated,
    Resizing,
    Error,
    Maintenance,
    Hibernating,
    Hibernated,
    Resuming,
    Decommissioning,
    Associating,
    Unknown,
    Other(String),
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Pending => "PENDING",
            Self::Preparing => "PREPARING",
            Self::Prepared => "PREPARED",
            Self::Initializing => "INITIALIZING",
            Self::Parking => "PARKING",
            Self::Parked => "PARKED",
            Self::Unparking => "UNPARKING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Resizing => "RESIZING",
            Self::Error => "ERROR",
            Self::Maintenance => "MAINTENANCE",
            Self::Hibernating => "HIBERNATING",
            Self::Hibernated => "HIBERNATED",
            Self::Resuming => "RESUMING",
            Self::Decommissioning => "DECOMMISSIONING",
            Self::Associating => "ASSOCIATING",
            Self::Unknown => "UNKNOWN",
            Self::Other(s) => s,
        }
    }

    /// The database will never become active from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Terminated | Self::Terminating)
    }
}

impl From<String> for DatabaseStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "PENDING" => Self::Pending,
            "PREPARING" => Self::Preparing,
            "PREPARED" => Self::Prepared,
            "INITIALIZING" => Self::Initializing,
            "PARKING" => Self::Parking,
            "PARKED" => Self::Parked,
            "UNPARKING" => Self::Unparking,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            "RESIZING" => Self::Resizing,
            "ERROR" => Self::Error,
            "MAINTENANCE" => Self::Maintenance,
            "HIBERNATING" => Self::Hibernating,
            "HIBERNATED" => Self::Hibernated,
            "RESUMING" => Self::Resuming,
            "DECOMMISSIONING" => Self::Decommissioning,
            "ASSOCIATING" => Self::Associating,
            "UNKNOWN" => Self::Unknown,
            _ => Self::Other(s),
        }
    }
}

impl From<DatabaseStatus> for String {
    fn from(status: DatabaseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    pub status: DatabaseStatus,
    #[serde(default)]
    pub info: DatabaseInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub keyspaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantToken {
    pub tokenid: String,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Routing locator and tenant token for one streaming call sequence.
///
/// Never cached across orchestrator runs.
#[derive(Clone, PartialEq, Eq)]
pub struct RoutingCredential {
    pub cluster: String,
    pub token: String,
    pub org_id: String,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for RoutingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingCredential")
            .field("cluster", &self.cluster)
            .field("token", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Body of the CDC enable/delete calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdcRequest {
    pub database_id: String,
    pub database_name: String,
    pub keyspace: String,
    pub org_id: String,
    pub table_name: String,
    pub topic_partitions: u32,
}

/// One entry of a tenant's CDC listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CdcEntry {
    pub org_id: String,
    pub cluster_name: String,
    pub tenant: String,
    pub namespace: String,
    pub connector_name: String,
    pub config_type: String,
    pub database_id: String,
    pub database_name: String,
    pub keyspace: String,
    pub database_table: String,
    pub connector_status: String,
    pub cdc_status: String,
    pub cod_status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub event_topic: String,
    pub data_topic: String,
    pub instances: u32,
    pub cpu: u32,
    pub memory: u32,
}

impl CdcEntry {
    /// Whether this entry is the pipeline for `database_id`/`keyspace`/`table`.
    ///
    /// Identities are stored lower-cased, so compare case-insensitively. An
    /// entry without a database id matches on keyspace and table alone.
    pub fn matches(&self, database_id: &str, keyspace: &str, table: &str) -> bool {
        (self.database_id.is_empty() || self.database_id.eq_ignore_ascii_case(database_id))
            && self.keyspace.eq_ignore_ascii_case(keyspace)
            && self.database_table.eq_ignore_ascii_case(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_decodes_with_unknown_status() {
        let json = r#"{
            "id": "db-1",
            "status": "SOMETHING_NEW",
            "info": { "name": "orders", "cloudProvider": "GCP", "region": "us-east1" }
        }"#;
        let db: Database = serde_json::from_str(json).unwrap();
        assert_eq!(db.status, DatabaseStatus::Other("SOMETHING_NEW".to_string()));
        assert!(!db.status.is_terminal());
        assert_eq!(db.info.cloud_provider.as_deref(), Some("GCP"));
        assert!(db.info.keyspaces.is_empty());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in ["ERROR", "TERMINATED", "TERMINATING"] {
            assert!(DatabaseStatus::from(status.to_string()).is_terminal());
        }
        assert!(!DatabaseStatus::Active.is_terminal());
        assert!(!DatabaseStatus::Initializing.is_terminal());
    }

    #[test]
    fn test_cdc_entry_decodes_partial_payload() {
        let json = r#"[{
            "keyspace": "ks1",
            "databaseTable": "orders",
            "databaseId": "db-1",
            "connectorStatus": "Running",
            "dataTopic": "persistent://tenant/astracdc/data-db-1-ks1.orders",
            "createdAt": "2023-01-10T10:00:00Z"
        }]"#;
        let entries: Vec<CdcEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].matches("DB-1", "ks1", "Orders"));
        assert!(!entries[0].matches("db-1", "ks1", "customers"));
        assert!(entries[0].created_at.is_some());
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = RoutingCredential {
            cluster: "pulsar-gcp-useast1".to_string(),
            token: "secret-token".to_string(),
            org_id: "org-1".to_string(),
            issued_at: Utc::now(),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("pulsar-gcp-useast1"));
    }
}
