//! Resource identity strings
//!
//! The caller persists one opaque string per provisioned entity and hands it
//! back on read/import. Encoding and arity-checked decoding live here so that
//! a malformed id is always reported as `ProvisionError::StructuralDecode`.

use std::fmt;

use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;

const KEYSPACE_DELIMITER: &str = "/keyspace/";
const CDC_DELIMITER: &str = "/";

/// Split `id` on `delimiter` and require exactly `expected_arity` non-empty
/// segments.
pub fn decode_fields(
    id: &str,
    delimiter: &str,
    expected_arity: usize,
    kind: &'static str,
    expected: &'static str,
) -> RetryOutcome<Vec<String>> {
    let parts: Vec<&str> = id.split(delimiter).collect();
    if parts.len() != expected_arity || parts.iter().any(|p| p.is_empty()) {
        return RetryOutcome::Fail(structural_error(kind, id, expected));
    }
    RetryOutcome::Proceed(parts.into_iter().map(str::to_string).collect())
}

fn structural_error(kind: &'static str, id: &str, expected: &'static str) -> ProvisionError {
    ProvisionError::StructuralDecode {
        kind,
        id: id.to_string(),
        expected,
    }
}

/// Identity of a keyspace: `<database_id>/keyspace/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyspaceId {
    pub database_id: String,
    pub name: String,
}

impl KeyspaceId {
    pub fn new(database_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            name: name.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.database_id, KEYSPACE_DELIMITER, self.name)
    }

    pub fn decode(id: &str) -> Result<Self, ProvisionError> {
        const EXPECTED: &str = "database_id/keyspace/name";
        let fields = decode_fields(id, KEYSPACE_DELIMITER, 2, "keyspace", EXPECTED).into_result()?;
        let [database_id, name]: [String; 2] = fields
            .try_into()
            .map_err(|_| structural_error("keyspace", id, EXPECTED))?;
        Ok(Self { database_id, name })
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyspace {}", self.encode())
    }
}

/// Identity of a CDC pipeline: `<database_id>/<keyspace>/<table>/<tenant>`,
/// always lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CdcId {
    pub database_id: String,
    pub keyspace: String,
    pub table: String,
    pub tenant: String,
}

impl CdcId {
    pub fn new(
        database_id: impl Into<String>,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            database_id: database_id.into(),
            keyspace: keyspace.into(),
            table: table.into(),
            tenant: tenant.into(),
        }
    }

    pub fn encode(&self) -> String {
        [
            self.database_id.as_str(),
            self.keyspace.as_str(),
            self.table.as_str(),
            self.tenant.as_str(),
        ]
        .join(CDC_DELIMITER)
        .to_lowercase()
    }

    pub fn decode(id: &str) -> Result<Self, ProvisionError> {
        const EXPECTED: &str = "database_id/keyspace/table/tenant_name";
        let fields = decode_fields(&id.to_lowercase(), CDC_DELIMITER, 4, "cdc", EXPECTED)
            .into_result()
            // Report the id as the caller supplied it.
            .map_err(|_| structural_error("cdc", id, EXPECTED))?;
        let [database_id, keyspace, table, tenant]: [String; 4] = fields
            .try_into()
            .map_err(|_| structural_error("cdc", id, EXPECTED))?;
        Ok(Self {
            database_id,
            keyspace,
            table,
            tenant,
        })
    }
}

impl fmt::Display for CdcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cdc {}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keyspace_id_format() {
        let id = KeyspaceId::new("db-1", "ks1");
        assert_eq!(id.encode(), "db-1/keyspace/ks1");
        assert_eq!(KeyspaceId::decode("db-1/keyspace/ks1").unwrap(), id);
    }

    #[test]
    fn test_keyspace_id_wrong_arity() {
        for bad in ["db-1", "db-1/ks1", "a/keyspace/b/keyspace/c", "db-1/keyspace/"] {
            let err = KeyspaceId::decode(bad).unwrap_err();
            assert!(
                matches!(err, ProvisionError::StructuralDecode { kind: "keyspace", .. }),
                "{bad} decoded as {err:?}"
            );
        }
    }

    #[test]
    fn test_cdc_id_is_lower_cased() {
        let id = CdcId::decode("DB-1/Ks1/Orders/MyTenant").unwrap();
        assert_eq!(id, CdcId::new("db-1", "ks1", "orders", "mytenant"));
        assert_eq!(
            CdcId::new("DB-1", "Ks1", "Orders", "MyTenant").encode(),
            "db-1/ks1/orders/mytenant"
        );
    }

    #[test]
    fn test_cdc_id_wrong_arity_keeps_original_text() {
        match CdcId::decode("DB-1/ks1/orders") {
            Err(ProvisionError::StructuralDecode { kind, id, .. }) => {
                assert_eq!(kind, "cdc");
                assert_eq!(id, "DB-1/ks1/orders");
            }
            other => panic!("expected structural error, got {other:?}"),
        }
        assert!(CdcId::decode("a/b/c/d/e").is_err());
    }

    proptest! {
        #[test]
        fn prop_keyspace_decode_inverts_encode(
            db in "[0-9a-f]{8}-[0-9a-f]{4}",
            name in "[a-zA-Z0-9][a-zA-Z0-9_]{0,48}",
        ) {
            let id = KeyspaceId::new(db, name);
            prop_assert_eq!(KeyspaceId::decode(&id.encode()).unwrap(), id);
        }

        #[test]
        fn prop_cdc_decode_inverts_encode(
            fields in proptest::array::uniform4("[a-z0-9_-]{1,16}"),
        ) {
            let [db, ks, table, tenant] = fields;
            let id = CdcId::new(db, ks, table, tenant);
            prop_assert_eq!(CdcId::decode(&id.encode()).unwrap(), id);
        }

        #[test]
        fn prop_cdc_other_segment_counts_fail(count in 1usize..8) {
            prop_assume!(count != 4);
            let id = vec!["x"; count].join("/");
            prop_assert!(CdcId::decode(&id).is_err());
        }
    }
}
