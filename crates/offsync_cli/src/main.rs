//! OffSync CLI
//!
//! Command-line tools for an OffSync replica.
//!
//! # Commands
//!
//! - `put` / `get` / `list` / `delete` - Work with local entities
//! - `status` - Show connectivity, queue and conflict counts
//! - `sync` - Run one sync pass against the remote
//! - `monitor` - Probe the remote and sync on reconnect until interrupted
//! - `history` - Show queued changes of an entity
//! - `conflicts` / `resolve` - Inspect and settle conflicts
//! - `backup` / `backups` / `restore` - Manage local store backups

mod commands;

use clap::{Parser, Subcommand};
use offsync_sync_engine::{SyncConfig, SyncEngine, SyncResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// OffSync replica tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the remote
    #[arg(
        global = true,
        short,
        long,
        env = "OFFSYNC_REMOTE_URL",
        default_value = "http://localhost:8080"
    )]
    remote: String,

    /// Directory holding the local store
    #[arg(
        global = true,
        short,
        long,
        env = "OFFSYNC_DATA_DIR",
        default_value = "data"
    )]
    data_dir: PathBuf,

    /// Directory for the change log, conflicts and backups
    /// (defaults to `<data-dir>/.sync`)
    #[arg(global = true, long, env = "OFFSYNC_SYNC_DIR")]
    sync_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save an entity locally and queue it for sync
    Put {
        /// Entity type
        entity_type: String,
        /// Entity ID
        entity_id: String,
        /// Entity content as JSON
        data: String,
    },

    /// Print a local entity
    Get {
        /// Entity type
        entity_type: String,
        /// Entity ID
        entity_id: String,
    },

    /// List local entities of a type, or all types
    List {
        /// Entity type
        entity_type: Option<String>,
    },

    /// Delete a local entity and queue the delete
    Delete {
        /// Entity type
        entity_type: String,
        /// Entity ID
        entity_id: String,
    },

    /// Show sync status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a sync pass
    Sync {
        /// Only sync this entity type (requires --entity-id)
        #[arg(long, requires = "entity_id")]
        entity_type: Option<String>,

        /// Only sync this entity
        #[arg(long, requires = "entity_type")]
        entity_id: Option<String>,
    },

    /// Probe the remote and sync whenever it comes back, until Ctrl-C
    Monitor {
        /// Seconds between probes
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// Show queued changes of an entity, newest first
    History {
        /// Entity type
        entity_type: String,
        /// Entity ID
        entity_id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve a conflict
    Resolve {
        /// Conflict ID
        conflict_id: String,

        /// Winner (local_wins, remote_wins); omit to apply last-write-wins
        resolution: Option<String>,
    },

    /// Back up the local store
    Backup {
        /// Backup name (defaults to the current time)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List backups
    Backups,

    /// Restore the local store from a backup
    Restore {
        /// Backup name, or path to a backup directory
        backup: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn engine(&self) -> SyncResult<SyncEngine> {
        let mut config = SyncConfig::new(self.remote.clone(), self.data_dir.clone());
        if let Some(sync_dir) = &self.sync_dir {
            config = config.with_sync_dir(sync_dir.clone());
        }
        if let Commands::Monitor { interval } = &self.command {
            config = config.with_probe_interval(Duration::from_secs(*interval));
        }
        SyncEngine::open(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("OffSync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let engine = cli.engine()?;
    match cli.command {
        Commands::Put {
            entity_type,
            entity_id,
            data,
        } => commands::entity::put(&engine, &entity_type, &entity_id, &data)?,
        Commands::Get {
            entity_type,
            entity_id,
        } => commands::entity::get(&engine, &entity_type, &entity_id)?,
        Commands::List { entity_type } => commands::entity::list(&engine, entity_type.as_deref())?,
        Commands::Delete {
            entity_type,
            entity_id,
        } => commands::entity::delete(&engine, &entity_type, &entity_id)?,
        Commands::Status { format } => commands::sync::status(&engine, &format).await?,
        Commands::Sync {
            entity_type,
            entity_id,
        } => {
            let entity = entity_type.zip(entity_id);
            commands::sync::run(&engine, entity).await?
        }
        Commands::Monitor { .. } => commands::sync::monitor(&engine).await?,
        Commands::History {
            entity_type,
            entity_id,
            format,
        } => commands::conflicts::history(&engine, &entity_type, &entity_id, &format)?,
        Commands::Conflicts { all, format } => commands::conflicts::list(&engine, all, &format)?,
        Commands::Resolve {
            conflict_id,
            resolution,
        } => commands::conflicts::resolve(&engine, &conflict_id, resolution.as_deref()).await?,
        Commands::Backup { name } => commands::backup::create(&engine, name.as_deref())?,
        Commands::Backups => commands::backup::list(&engine)?,
        Commands::Restore { backup } => commands::backup::restore(&engine, &backup)?,
        Commands::Version => {}
    }

    Ok(())
}
