//! RetryOrchestrator: drives one create or delete to a terminal state.
//!
//! ```text
//! AwaitParentActive -> ResolveCredential -> Mutate -> AwaitConvergence -> Done
//!        ^  (Retry)          ^  (stale credential)  |
//!        +-------------------+----------------------+
//! ```
//!
//! - `Retry` outcomes loop back to `AwaitParentActive` and are bounded by the
//!   operation deadline (and by the status policy's attempt ceiling, if any).
//! - A stale-credential `PermissionDenied` from `Mutate` loops back to
//!   `ResolveCredential`, bounded by the credential policy.
//! - Any other `Fail` is terminal. No remote call is made after `Done` or a
//!   returned error.
//!
//! The access guard is taken before each parent-status read and released as
//! soon as the mutation call returns, never held across a sleep.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use crate::control_plane::{DatabaseApi, RoutingCredential, StreamingApi};
use crate::error::ProvisionError;
use crate::outcome::RetryOutcome;
use crate::retry::{Interrupt, OperationContext, RetryPolicy};

use super::{
    AccessGuard, ConvergencePoller, CredentialResolver, DependentEntity, EntitySnapshot,
    MutationExecutor, MutationOp, StatusPoller,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitParentActive,
    ResolveCredential,
    Mutate,
    AwaitConvergence,
    Done,
}

/// Terminal success of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    /// Encoded identity of the entity that was created or removed.
    pub identity: String,
    /// Observed fields for a create; `None` for a delete.
    pub snapshot: Option<EntitySnapshot>,
    pub status_polls: u32,
    pub credential_resolutions: u32,
    pub mutation_attempts: u32,
}

pub struct RetryOrchestrator {
    status: StatusPoller,
    credentials: CredentialResolver,
    executor: MutationExecutor,
    convergence: ConvergencePoller,
    guard: AccessGuard,
    status_retry: RetryPolicy,
    credential_retry: RetryPolicy,
}

/// Per-run bookkeeping.
#[derive(Default)]
struct RunState {
    status_polls: u32,
    credential_resolutions: u32,
    stale_credential_attempts: u32,
    mutation_attempts: u32,
    mutation_accepted: bool,
    last_reason: Option<ProvisionError>,
    credential: Option<RoutingCredential>,
    held: Option<OwnedMutexGuard<()>>,
    snapshot: Option<EntitySnapshot>,
}

impl RunState {
    fn interrupted(&self, interrupt: Interrupt) -> ProvisionError {
        interrupt.into_error(self.last_reason.as_ref(), self.mutation_accepted)
    }
}

impl RetryOrchestrator {
    pub fn new(
        databases: Arc<dyn DatabaseApi>,
        streaming: Arc<dyn StreamingApi>,
        guard: AccessGuard,
        status_retry: RetryPolicy,
        convergence_retry: RetryPolicy,
        credential_retry: RetryPolicy,
    ) -> Self {
        Self {
            status: StatusPoller::new(databases.clone()),
            credentials: CredentialResolver::new(databases.clone(), streaming.clone()),
            executor: MutationExecutor::new(databases.clone(), streaming.clone()),
            convergence: ConvergencePoller::new(databases, streaming, convergence_retry),
            guard,
            status_retry,
            credential_retry,
        }
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    pub fn convergence(&self) -> &ConvergencePoller {
        &self.convergence
    }

    pub async fn create(
        &self,
        entity: &DependentEntity,
        ctx: &OperationContext,
    ) -> Result<OperationReport, ProvisionError> {
        self.run(MutationOp::Create, entity, ctx).await
    }

    pub async fn delete(
        &self,
        entity: &DependentEntity,
        ctx: &OperationContext,
    ) -> Result<OperationReport, ProvisionError> {
        self.run(MutationOp::Delete, entity, ctx).await
    }

    pub async fn run(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        ctx: &OperationContext,
    ) -> Result<OperationReport, ProvisionError> {
        let mut state = RunState::default();
        let mut phase = Phase::AwaitParentActive;

        tracing::info!(entity = %entity, op = %op, "starting provisioning run");

        loop {
            phase = match phase {
                Phase::AwaitParentActive => {
                    self.await_parent_active(op, entity, ctx, &mut state).await?
                }
                Phase::ResolveCredential => {
                    self.resolve_credential(entity, ctx, &mut state).await?
                }
                Phase::Mutate => self.mutate(op, entity, ctx, &mut state).await?,
                Phase::AwaitConvergence => {
                    state.snapshot = self.await_convergence(op, entity, ctx, &state).await?;
                    Phase::Done
                }
                Phase::Done => {
                    tracing::info!(
                        entity = %entity,
                        op = %op,
                        mutation_attempts = state.mutation_attempts,
                        credential_resolutions = state.credential_resolutions,
                        "provisioning run complete"
                    );
                    return Ok(OperationReport {
                        identity: entity.identity(),
                        snapshot: state.snapshot,
                        status_polls: state.status_polls,
                        credential_resolutions: state.credential_resolutions,
                        mutation_attempts: state.mutation_attempts,
                    });
                }
            };
        }
    }

    async fn await_parent_active(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        ctx: &OperationContext,
        state: &mut RunState,
    ) -> Result<Phase, ProvisionError> {
        let held = ctx
            .run(self.guard.acquire())
            .await
            .map_err(|i| state.interrupted(i))?;

        state.status_polls += 1;
        let outcome = ctx
            .run(self.status.poll(entity.database_id()))
            .await
            .map_err(|i| state.interrupted(i))?;

        match outcome {
            RetryOutcome::Proceed(_) => {
                state.held = Some(held);
                Ok(if entity.needs_credential() {
                    Phase::ResolveCredential
                } else {
                    Phase::Mutate
                })
            }
            RetryOutcome::Retry(reason) => {
                drop(held);
                self.wait_before_retry(op, entity, ctx, state, reason).await?;
                Ok(Phase::AwaitParentActive)
            }
            RetryOutcome::Fail(reason) => {
                Err(self.escalate(entity, Phase::AwaitParentActive, reason))
            }
        }
    }

    async fn resolve_credential(
        &self,
        entity: &DependentEntity,
        ctx: &OperationContext,
        state: &mut RunState,
    ) -> Result<Phase, ProvisionError> {
        let Some(tenant) = entity.tenant() else {
            return Ok(Phase::Mutate);
        };
        if state.held.is_none() {
            let held = ctx
                .run(self.guard.acquire())
                .await
                .map_err(|i| state.interrupted(i))?;
            state.held = Some(held);
        }

        state.credential_resolutions += 1;
        let outcome = ctx
            .run(self.credentials.resolve(entity.database_id(), tenant))
            .await
            .map_err(|i| state.interrupted(i))?;

        match outcome {
            RetryOutcome::Proceed(credential) => {
                state.credential = Some(credential);
                Ok(Phase::Mutate)
            }
            RetryOutcome::Retry(reason) | RetryOutcome::Fail(reason) => {
                state.held = None;
                Err(self.escalate(entity, Phase::ResolveCredential, reason))
            }
        }
    }

    async fn mutate(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        ctx: &OperationContext,
        state: &mut RunState,
    ) -> Result<Phase, ProvisionError> {
        if let Err(interrupt) = ctx.checkpoint() {
            state.held = None;
            return Err(state.interrupted(interrupt));
        }

        // Runs to completion once sent so an accepted mutation is never lost.
        state.mutation_attempts += 1;
        let outcome = self
            .executor
            .apply(op, entity, state.credential.as_ref())
            .await;
        state.held = None;

        match outcome {
            RetryOutcome::Proceed(()) => {
                state.mutation_accepted = true;
                tracing::info!(entity = %entity, op = %op, "mutation accepted");
                Ok(Phase::AwaitConvergence)
            }
            RetryOutcome::Retry(reason) => {
                self.wait_before_retry(op, entity, ctx, state, reason).await?;
                Ok(Phase::AwaitParentActive)
            }
            RetryOutcome::Fail(reason) if reason.is_stale_credential() => {
                state.stale_credential_attempts += 1;
                if !self.credential_retry.allows(state.stale_credential_attempts) {
                    let escalated = match reason {
                        ProvisionError::PermissionDenied { context, detail, .. } => {
                            ProvisionError::PermissionDenied {
                                context,
                                detail: format!(
                                    "{detail} (gave up after {} credential refreshes)",
                                    state.stale_credential_attempts
                                ),
                                stale_credential: true,
                            }
                        }
                        other => other,
                    };
                    return Err(self.escalate(entity, Phase::Mutate, escalated));
                }
                let delay = self.credential_retry.delay_after(state.stale_credential_attempts);
                tracing::warn!(
                    entity = %entity,
                    attempt = state.stale_credential_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "streaming credential rejected, refreshing"
                );
                state.credential = None;
                state.last_reason = Some(reason);
                ctx.sleep(delay).await.map_err(|i| state.interrupted(i))?;
                Ok(Phase::ResolveCredential)
            }
            RetryOutcome::Fail(reason) => Err(self.escalate(entity, Phase::Mutate, reason)),
        }
    }

    async fn await_convergence(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        ctx: &OperationContext,
        state: &RunState,
    ) -> Result<Option<EntitySnapshot>, ProvisionError> {
        let credential = state.credential.as_ref();
        let outcome = match op {
            MutationOp::Create => self
                .convergence
                .await_visible(entity, credential, ctx)
                .await
                .map(Some),
            MutationOp::Delete => self
                .convergence
                .await_absent(entity, credential, ctx)
                .await
                .map(|()| None),
        };
        match outcome {
            RetryOutcome::Proceed(snapshot) => Ok(snapshot),
            RetryOutcome::Retry(reason) | RetryOutcome::Fail(reason) => {
                // The mutation was accepted: every failure from here on must
                // still report that the change may exist remotely.
                let reason = if state.mutation_accepted && !reason.possibly_applied() {
                    ProvisionError::Unconfirmed {
                        entity: entity.to_string(),
                        reason: Box::new(reason),
                    }
                } else {
                    reason
                };
                Err(self.escalate(entity, Phase::AwaitConvergence, reason))
            }
        }
    }

    /// Sleep before looping back to the parent-status read, honouring the
    /// status policy's ceiling and the caller's deadline.
    async fn wait_before_retry(
        &self,
        op: MutationOp,
        entity: &DependentEntity,
        ctx: &OperationContext,
        state: &mut RunState,
        reason: ProvisionError,
    ) -> Result<(), ProvisionError> {
        let attempt = state.status_polls;
        if !self.status_retry.allows(attempt) {
            return Err(self.escalate(entity, Phase::AwaitParentActive, reason));
        }
        let delay = self.status_retry.delay_after(attempt);
        tracing::warn!(
            entity = %entity,
            op = %op,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "retrying"
        );
        state.last_reason = Some(reason);
        ctx.sleep(delay).await.map_err(|i| state.interrupted(i))
    }

    fn escalate(
        &self,
        entity: &DependentEntity,
        phase: Phase,
        reason: ProvisionError,
    ) -> ProvisionError {
        tracing::error!(
            entity = %entity,
            phase = ?phase,
            error = %reason,
            "provisioning run failed"
        );
        reason
    }
}
