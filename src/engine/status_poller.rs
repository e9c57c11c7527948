//! Parent database status reads.

use std::sync::Arc;

use crate::control_plane::{ApiResult, Database, DatabaseApi, DatabaseStatus};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;

/// What the engine needs from an active database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentStatusSnapshot {
    pub database_id: String,
    pub status: DatabaseStatus,
    pub name: Option<String>,
    pub cloud_provider: Option<String>,
    pub region: Option<String>,
}

impl From<Database> for ParentStatusSnapshot {
    fn from(db: Database) -> Self {
        Self {
            database_id: db.id,
            status: db.status,
            name: db.info.name,
            cloud_provider: db.info.cloud_provider,
            region: db.info.region,
        }
    }
}

/// Classify a database read, in priority order: transport failure and 5xx
/// retry; any other non-200 or a missing body fails; a terminal status fails;
/// `ACTIVE` proceeds; anything else retries.
pub fn classify_database_response(
    database_id: &str,
    result: ApiResult<Database>,
) -> RetryOutcome<ParentStatusSnapshot> {
    let response = match result {
        Ok(response) => response,
        Err(e) => return RetryOutcome::Retry(ProvisionError::transport("fetching database", e)),
    };

    if response.status >= 500 {
        return RetryOutcome::Retry(ProvisionError::transport(
            "fetching database",
            format!("status {}: {}", response.status, response.raw),
        ));
    }

    let db = match response.body {
        Some(db) if response.status == 200 => db,
        _ => {
            return RetryOutcome::Fail(ProvisionError::UnexpectedResponseShape {
                context: "fetching database".to_string(),
                status: response.status,
                body: response.raw,
            })
        }
    };

    if db.status.is_terminal() {
        RetryOutcome::Fail(ProvisionError::ParentTerminal {
            database_id: database_id.to_string(),
            status: db.status.to_string(),
        })
    } else if db.status == DatabaseStatus::Active {
        RetryOutcome::Proceed(db.into())
    } else {
        RetryOutcome::Retry(ProvisionError::ParentNotReady {
            database_id: database_id.to_string(),
            status: db.status.to_string(),
        })
    }
}

/// Reads the parent database once per call; the orchestrator loops.
pub struct StatusPoller {
    databases: Arc<dyn DatabaseApi>,
}

impl StatusPoller {
    pub fn new(databases: Arc<dyn DatabaseApi>) -> Self {
        Self { databases }
    }

    pub async fn poll(&self, database_id: &str) -> RetryOutcome<ParentStatusSnapshot> {
        let outcome =
            classify_database_response(database_id, self.databases.get_database(database_id).await);
        if let RetryOutcome::Proceed(snapshot) = &outcome {
            tracing::debug!(database_id, status = %snapshot.status, "database is active");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ApiResponse, DatabaseInfo, TransportError};

    fn database(status: &str) -> Database {
        Database {
            id: "db-1".to_string(),
            status: DatabaseStatus::from(status.to_string()),
            info: DatabaseInfo {
                name: Some("orders".to_string()),
                cloud_provider: Some("AWS".to_string()),
                region: Some("us-east-1".to_string()),
                keyspaces: vec![],
            },
        }
    }

    fn classify(status: &str) -> RetryOutcome<ParentStatusSnapshot> {
        classify_database_response("db-1", Ok(ApiResponse::ok(200, database(status))))
    }

    #[test]
    fn test_terminal_statuses_fail() {
        for status in ["ERROR", "TERMINATED", "TERMINATING"] {
            match classify(status) {
                RetryOutcome::Fail(ProvisionError::ParentTerminal { status: s, .. }) => {
                    assert_eq!(s, status)
                }
                other => panic!("{status}: expected ParentTerminal, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_terminal_statuses_retry() {
        for status in [
            "PENDING",
            "INITIALIZING",
            "PARKED",
            "HIBERNATED",
            "MAINTENANCE",
            "RESIZING",
            "UNKNOWN",
            "BRAND_NEW_STATUS",
        ] {
            assert!(classify(status).is_retry(), "{status} should retry");
        }
    }

    #[test]
    fn test_active_proceeds_with_snapshot() {
        match classify("ACTIVE") {
            RetryOutcome::Proceed(snapshot) => {
                assert_eq!(snapshot.region.as_deref(), Some("us-east-1"));
                assert_eq!(snapshot.cloud_provider.as_deref(), Some("AWS"));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_and_server_errors_retry() {
        let transport = classify_database_response(
            "db-1",
            Err(TransportError::new("fetching database", "connection reset")),
        );
        assert!(transport.is_retry());

        let server = classify_database_response("db-1", Ok(ApiResponse::error(503, "busy")));
        assert!(server.is_retry());
    }

    #[test]
    fn test_unexpected_shapes_fail() {
        let not_found = classify_database_response("db-1", Ok(ApiResponse::error(404, "nope")));
        assert!(matches!(
            not_found,
            RetryOutcome::Fail(ProvisionError::UnexpectedResponseShape { status: 404, .. })
        ));

        let accepted = classify_database_response("db-1", Ok(ApiResponse::ok(202, database("ACTIVE"))));
        assert!(accepted.is_fail());

        let empty = classify_database_response(
            "db-1",
            Ok(ApiResponse {
                status: 200,
                body: None,
                raw: "not json".to_string(),
            }),
        );
        assert!(empty.is_fail());
    }
}
