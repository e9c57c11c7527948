//! Attribute validation applied before any remote call.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::ProvisionError;

static KEYSPACE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_]{0,48}$").unwrap());

/// Keyspace names: up to 49 alphanumerics or underscores, starting with a
/// letter or digit.
pub fn keyspace_name(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    if KEYSPACE_NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(ProvisionError::Validation {
            field,
            message: format!(
                "{value}: invalid keyspace name - must match {}",
                KEYSPACE_NAME_RE.as_str()
            ),
        })
    }
}

pub fn database_id(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|e| ProvisionError::Validation {
            field,
            message: format!("expected a UUID, got '{value}': {e}"),
        })
}

pub fn table_name(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    if value.chars().count() >= 2 {
        Ok(())
    } else {
        Err(ProvisionError::Validation {
            field,
            message: "name must be at least 2 characters".to_string(),
        })
    }
}

pub fn not_empty(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    if value.trim().is_empty() {
        Err(ProvisionError::Validation {
            field,
            message: "must not be empty".to_string(),
        })
    } else {
        Ok(())
    }
}

pub fn positive(field: &'static str, value: u32) -> Result<(), ProvisionError> {
    if value == 0 {
        Err(ProvisionError::Validation {
            field,
            message: "must be greater than zero".to_string(),
        })
    } else {
        Ok(())
    }
}
