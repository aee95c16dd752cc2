//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use deck_core::config::Manifest;
use deck_core::sync::SyncOptions;
use deck_store::{EntityKind, StoreRole};

/// decksync - keep a Gateway and its control plane in agreement
#[derive(Parser, Debug)]
#[command(name = "deck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file to use instead of ./deck.toml
    #[arg(long, global = true, env = "DECK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Connection settings; each one overrides the settings files
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    /// Gateway admin API address
    #[arg(long, global = true, env = "DECK_GATEWAY_URL", value_name = "URL")]
    pub gateway_url: Option<String>,

    /// Gateway admin token
    #[arg(long, global = true, env = "DECK_GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,

    /// Control plane API address
    #[arg(long, global = true, env = "DECK_CONTROL_PLANE_URL", value_name = "URL")]
    pub control_plane_url: Option<String>,

    /// Control plane id
    #[arg(long, global = true, env = "DECK_CONTROL_PLANE_ID", value_name = "ID")]
    pub control_plane_id: Option<String>,

    /// Control plane access token
    #[arg(long, global = true, env = "DECK_CONTROL_PLANE_TOKEN", hide_env_values = true)]
    pub control_plane_token: Option<String>,

    /// Directory holding the sync audit log
    #[arg(long, global = true, env = "DECK_AUDIT_DIR", value_name = "DIR")]
    pub audit_dir: Option<PathBuf>,
}

impl ConnectionArgs {
    /// The flags as the last settings layer
    pub fn to_manifest(&self) -> Manifest {
        let mut manifest = Manifest::empty();
        manifest.gateway.url = self.gateway_url.clone();
        manifest.gateway.token = self.gateway_token.clone();
        manifest.control_plane.url = self.control_plane_url.clone();
        manifest.control_plane.id = self.control_plane_id.clone();
        manifest.control_plane.token = self.control_plane_token.clone();
        manifest.sync.audit_dir = self.audit_dir.clone();
        manifest
    }
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Synchronize the Gateway and the control plane
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Export the state of one store as a declarative file
    Dump {
        #[command(flatten)]
        selection: Selection,

        /// Embed consumer credentials
        #[arg(long)]
        include_credentials: bool,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Emit JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Compare a state file with the live state of one store
    Diff {
        /// Declarative state file (YAML or JSON)
        #[arg(short = 's', long = "state", value_name = "FILE")]
        state: PathBuf,

        #[command(flatten)]
        selection: Selection,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Make one store match a state file
    Apply {
        /// Declarative state file (YAML or JSON)
        #[arg(short = 's', long = "state", value_name = "FILE")]
        state: PathBuf,

        #[command(flatten)]
        selection: Selection,

        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Sync subcommands
///
/// Examples:
///   deck sync status
///   deck sync push --type services --dry-run
///   deck sync pull --skip-conflicts
///   deck sync rollback 3f0c9a4e-...
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Copy Gateway state to the control plane
    Push(SyncArgs),

    /// Copy control-plane state to the Gateway
    Pull(SyncArgs),

    /// Show how the two stores differ
    Status {
        /// Entity types to compare (repeatable)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        types: Vec<EntityKind>,

        /// Compare upstream targets too
        #[arg(long)]
        include_targets: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Undo a recorded sync
    Rollback {
        /// Id printed when the sync ran
        sync_id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List recorded syncs
    History {
        /// Show only the most recent N syncs
        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<usize>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}

/// Flags shared by push and pull
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    /// Entity types to sync (repeatable); defaults to every type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub types: Vec<EntityKind>,

    /// Skip confirmation and overwrite drifted entities
    #[arg(long)]
    pub force: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Leave drifted entities untouched
    #[arg(long)]
    pub skip_conflicts: bool,

    /// Decide each drifted entity interactively
    #[arg(long)]
    pub interactive: bool,

    /// Show field-level drift
    #[arg(long)]
    pub with_drift: bool,

    /// Sync upstream targets too
    #[arg(long)]
    pub include_targets: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn options(&self, kinds: Vec<EntityKind>) -> SyncOptions {
        SyncOptions {
            kinds,
            force: self.force,
            dry_run: self.dry_run,
            skip_conflicts: self.skip_conflicts,
            interactive: self.interactive,
            with_drift: self.with_drift,
            include_targets: self.include_targets,
        }
    }
}

/// Which store a file command works on, and which types
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Store to read or write
    #[arg(long, value_enum, default_value_t = Target::Gateway)]
    pub target: Target,

    /// Entity types (repeatable); defaults to every type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub types: Vec<EntityKind>,

    /// Include upstream targets
    #[arg(long)]
    pub include_targets: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Gateway,
    ControlPlane,
}

impl From<Target> for StoreRole {
    fn from(target: Target) -> Self {
        match target {
            Target::Gateway => StoreRole::Gateway,
            Target::ControlPlane => StoreRole::ControlPlane,
        }
    }
}
