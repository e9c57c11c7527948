//! Keyspace resource: a named keyspace inside an existing database.

use serde::{Deserialize, Serialize};

use super::{read_step, Provisioner};
use crate::engine::DependentEntity;
use crate::error::ProvisionError;
use crate::identity::KeyspaceId;
use crate::retry::OperationContext;
use crate::validate;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceState {
    /// `<database_id>/keyspace/<name>` once created; `None` when absent.
    pub id: Option<String>,
    pub database_id: String,
    pub name: String,
}

impl KeyspaceState {
    pub fn new(database_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            database_id: database_id.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        validate::keyspace_name("name", &self.name)?;
        validate::database_id("database_id", &self.database_id)
    }

    fn key(&self) -> KeyspaceId {
        KeyspaceId::new(&self.database_id, &self.name)
    }

    fn set_identity(&mut self, key: &KeyspaceId) {
        self.id = Some(key.encode());
        self.database_id = key.database_id.clone();
        self.name = key.name.clone();
    }
}

impl Provisioner {
    /// Wait for the database to be active, add the keyspace and confirm it is
    /// listed.
    pub async fn create_keyspace(
        &self,
        state: &mut KeyspaceState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        state.validate()?;
        let key = state.key();
        let entity = DependentEntity::Keyspace(key.clone());
        match self.orchestrator.create(&entity, ctx).await {
            Ok(_) => {
                state.set_identity(&key);
                Ok(())
            }
            Err(err) if err.possibly_applied() => {
                // Keep the identity so the next read settles what happened.
                state.set_identity(&key);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Refresh from the database's keyspace listing; clears the identity when
    /// the keyspace no longer exists.
    pub async fn read_keyspace(
        &self,
        state: &mut KeyspaceState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        let Some(id) = state.id.clone() else {
            return Ok(());
        };
        let key = KeyspaceId::decode(&id)?;
        let entity = DependentEntity::Keyspace(key.clone());

        match read_step(ctx, self.orchestrator.convergence().observe(&entity, None)).await? {
            Some(_) => state.set_identity(&key),
            None => {
                tracing::info!(id = %id, "keyspace not found, removing from state");
                state.id = None;
            }
        }
        Ok(())
    }

    pub async fn delete_keyspace(
        &self,
        state: &mut KeyspaceState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        let key = match &state.id {
            Some(id) => KeyspaceId::decode(id)?,
            None => state.key(),
        };
        self.orchestrator
            .delete(&DependentEntity::Keyspace(key), ctx)
            .await?;
        state.id = None;
        Ok(())
    }

    /// Restore state from a persisted identity and read it.
    pub async fn import_keyspace(
        &self,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<KeyspaceState, ProvisionError> {
        let key = KeyspaceId::decode(id)?;
        let mut state = KeyspaceState::default();
        state.set_identity(&key);
        self.read_keyspace(&mut state, ctx).await?;
        Ok(state)
    }
}
