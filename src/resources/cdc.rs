//! CDC resource: change data capture from one table into a streaming tenant.

use serde::{Deserialize, Serialize};

use super::{read_step, Provisioner};
use crate::engine::{CdcTarget, DependentEntity, EntitySnapshot};
use crate::error::ProvisionError;
use crate::identity::CdcId;
use crate::retry::OperationContext;
use crate::validate;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdcState {
    /// `<database_id>/<keyspace>/<table>/<tenant_name>` once created.
    pub id: Option<String>,
    pub database_id: String,
    pub database_name: String,
    pub keyspace: String,
    pub table: String,
    pub topic_partitions: u32,
    pub tenant_name: String,
    /// Observed connector status.
    pub connector_status: Option<String>,
    /// Topic that receives the table's change events.
    pub data_topic: Option<String>,
}

impl CdcState {
    pub fn validate(&self) -> Result<(), ProvisionError> {
        validate::database_id("database_id", &self.database_id)?;
        validate::not_empty("database_name", &self.database_name)?;
        validate::keyspace_name("keyspace", &self.keyspace)?;
        validate::table_name("table", &self.table)?;
        validate::positive("topic_partitions", self.topic_partitions)?;
        validate::not_empty("tenant_name", &self.tenant_name)
    }

    fn key(&self) -> CdcId {
        CdcId::new(&self.database_id, &self.keyspace, &self.table, &self.tenant_name)
    }

    fn target(&self, id: CdcId) -> CdcTarget {
        CdcTarget {
            id,
            database_name: self.database_name.clone(),
            topic_partitions: self.topic_partitions,
        }
    }

    fn set_identity(&mut self, key: &CdcId) {
        self.id = Some(key.encode());
    }

    fn apply_snapshot(&mut self, snapshot: EntitySnapshot) {
        if let EntitySnapshot::Cdc {
            connector_status,
            data_topic,
            database_name,
        } = snapshot
        {
            self.connector_status = Some(connector_status);
            self.data_topic = Some(data_topic);
            if self.database_name.is_empty() {
                self.database_name = database_name;
            }
        }
    }
}

impl Provisioner {
    /// Enable CDC for the table and capture the connector status and data
    /// topic once the pipeline is listed.
    pub async fn create_cdc(
        &self,
        state: &mut CdcState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        state.validate()?;
        let key = state.key();
        let entity = DependentEntity::Cdc(state.target(key.clone()));
        match self.orchestrator.create(&entity, ctx).await {
            Ok(report) => {
                if let Some(snapshot) = report.snapshot {
                    state.apply_snapshot(snapshot);
                }
                state.set_identity(&key);
                Ok(())
            }
            Err(err) if err.possibly_applied() => {
                state.set_identity(&key);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Refresh the observed fields from the tenant's CDC listing; clears the
    /// identity when no entry matches.
    pub async fn read_cdc(
        &self,
        state: &mut CdcState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        let Some(id) = state.id.clone() else {
            return Ok(());
        };
        let key = CdcId::decode(&id)?;
        let credential = read_step(
            ctx,
            self.orchestrator
                .credentials()
                .resolve(&key.database_id, &key.tenant),
        )
        .await?;
        let entity = DependentEntity::Cdc(state.target(key.clone()));

        match read_step(
            ctx,
            self.orchestrator
                .convergence()
                .observe(&entity, Some(&credential)),
        )
        .await?
        {
            Some(snapshot) => state.apply_snapshot(snapshot),
            None => {
                tracing::info!(id = %id, "cdc not found, removing from state");
                state.id = None;
            }
        }
        Ok(())
    }

    pub async fn delete_cdc(
        &self,
        state: &mut CdcState,
        ctx: &OperationContext,
    ) -> Result<(), ProvisionError> {
        let key = match &state.id {
            Some(id) => CdcId::decode(id)?,
            None => state.key(),
        };
        let entity = DependentEntity::Cdc(state.target(key));
        self.orchestrator.delete(&entity, ctx).await?;
        state.id = None;
        Ok(())
    }

    /// Restore state from a persisted identity and read it. The topic
    /// partition count is not observable and stays unset.
    pub async fn import_cdc(
        &self,
        id: &str,
        ctx: &OperationContext,
    ) -> Result<CdcState, ProvisionError> {
        let key = CdcId::decode(id)?;
        let mut state = CdcState {
            database_id: key.database_id.clone(),
            keyspace: key.keyspace.clone(),
            table: key.table.clone(),
            tenant_name: key.tenant.clone(),
            ..CdcState::default()
        };
        state.set_identity(&key);
        self.read_cdc(&mut state, ctx).await?;
        Ok(state)
    }
}
