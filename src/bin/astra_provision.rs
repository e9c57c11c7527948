//! Command line front end for keyspace and CDC provisioning.
//!
//! # Usage
//!
//! ```bash
//! # Create a keyspace (token from ASTRA_API_TOKEN or .env)
//! astra-provision keyspace create --database-id <uuid> --name orders
//!
//! # Enable CDC for a table
//! astra-provision cdc create --database-id <uuid> --database-name shop \
//!     --keyspace orders --table line_items --tenant shop-events
//!
//! # Import an existing entity by its identity
//! astra-provision import keyspace <uuid>/keyspace/orders
//! ```
//!
//! The resulting state is printed as JSON. Ctrl-C cancels the running
//! operation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;

use astra_provision::identity::{CdcId, KeyspaceId};
use astra_provision::resources::{CdcState, KeyspaceState, Provisioner};
use astra_provision::{telemetry, AccessGuard, OperationContext, ProviderConfig, ProvisionError};

#[derive(Parser)]
#[command(name = "astra-provision")]
#[command(version)]
#[command(about = "Provision keyspaces and CDC pipelines on Astra databases")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file (defaults to ASTRA_* environment variables)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage a keyspace
    Keyspace {
        #[command(subcommand)]
        action: KeyspaceAction,
    },

    /// Manage a CDC pipeline
    Cdc {
        #[command(subcommand)]
        action: CdcAction,
    },

    /// Read an existing entity from its identity string
    Import {
        kind: ResourceKind,
        /// e.g. `<database_id>/keyspace/<name>`
        id: String,
    },
}

#[derive(Subcommand)]
enum KeyspaceAction {
    Create(KeyspaceArgs),
    Delete(KeyspaceArgs),
    Read(KeyspaceArgs),
}

#[derive(Args)]
struct KeyspaceArgs {
    #[arg(long)]
    database_id: String,
    #[arg(long)]
    name: String,
}

#[derive(Subcommand)]
enum CdcAction {
    Create(CdcArgs),
    Delete(CdcArgs),
    Read(CdcArgs),
}

#[derive(Args)]
struct CdcArgs {
    #[arg(long)]
    database_id: String,
    /// Required for create
    #[arg(long, default_value = "")]
    database_name: String,
    #[arg(long)]
    keyspace: String,
    #[arg(long)]
    table: String,
    #[arg(long, default_value_t = 3)]
    topic_partitions: u32,
    #[arg(long)]
    tenant: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResourceKind {
    Keyspace,
    Cdc,
}

impl From<KeyspaceArgs> for KeyspaceState {
    fn from(args: KeyspaceArgs) -> Self {
        KeyspaceState::new(args.database_id, args.name)
    }
}

impl From<CdcArgs> for CdcState {
    fn from(args: CdcArgs) -> Self {
        CdcState {
            database_id: args.database_id,
            database_name: args.database_name,
            keyspace: args.keyspace,
            table: args.table,
            topic_partitions: args.topic_partitions,
            tenant_name: args.tenant,
            ..CdcState::default()
        }
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ProviderConfig::load_from_file(path)?,
        None => ProviderConfig::from_env()?,
    };
    let provisioner = Provisioner::from_config(&config, AccessGuard::new())?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });
    let ctx = provisioner.context().with_cancellation(cancel_rx);

    match cli.command {
        Commands::Keyspace { action } => keyspace(&provisioner, action, &ctx).await,
        Commands::Cdc { action } => cdc(&provisioner, action, &ctx).await,
        Commands::Import { kind, id } => match kind {
            ResourceKind::Keyspace => print_state(&provisioner.import_keyspace(&id, &ctx).await?),
            ResourceKind::Cdc => print_state(&provisioner.import_cdc(&id, &ctx).await?),
        },
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn keyspace(
    provisioner: &Provisioner,
    action: KeyspaceAction,
    ctx: &OperationContext,
) -> Result<()> {
    match action {
        KeyspaceAction::Create(args) => {
            let mut state = KeyspaceState::from(args);
            let result = provisioner.create_keyspace(&mut state, ctx).await;
            finish(&state, result)
        }
        KeyspaceAction::Delete(args) => {
            let mut state = KeyspaceState::from(args);
            let result = provisioner.delete_keyspace(&mut state, ctx).await;
            finish(&state, result)
        }
        KeyspaceAction::Read(args) => {
            let mut state = KeyspaceState::from(args);
            state.id = Some(KeyspaceId::new(&state.database_id, &state.name).encode());
            let result = provisioner.read_keyspace(&mut state, ctx).await;
            finish(&state, result)
        }
    }
}

async fn cdc(provisioner: &Provisioner, action: CdcAction, ctx: &OperationContext) -> Result<()> {
    match action {
        CdcAction::Create(args) => {
            let mut state = CdcState::from(args);
            let result = provisioner.create_cdc(&mut state, ctx).await;
            finish(&state, result)
        }
        CdcAction::Delete(args) => {
            let mut state = CdcState::from(args);
            let result = provisioner.delete_cdc(&mut state, ctx).await;
            finish(&state, result)
        }
        CdcAction::Read(args) => {
            let mut state = CdcState::from(args);
            let id = CdcId::new(
                &state.database_id,
                &state.keyspace,
                &state.table,
                &state.tenant_name,
            );
            state.id = Some(id.encode());
            let result = provisioner.read_cdc(&mut state, ctx).await;
            finish(&state, result)
        }
    }
}

/// Print the state even on failure: a possibly-applied create still carries
/// its identity.
fn finish<S: Serialize>(state: &S, result: Result<(), ProvisionError>) -> Result<()> {
    print_state(state)?;
    if let Err(e) = &result {
        if e.possibly_applied() {
            eprintln!("warning: the change may have been applied; read the entity to confirm");
        }
    }
    result.map_err(Into::into)
}

fn print_state<S: Serialize>(state: &S) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Serializing state")?;
    println!("{json}");
    Ok(())
}
