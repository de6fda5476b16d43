//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Talos - task context caching and integrity engine
///
/// Caches immutable per-task context bundles, attaches typed evidence,
/// runs declared validation commands, and detects drift between a
/// bundle's snapshot and the live source tree.
#[derive(Parser, Debug)]
#[command(name = "talos")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TALOS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the context bundle for a unit of work
    Init(InitArgs),

    /// Show a stored bundle
    Show(ShowArgs),

    /// List stored bundles
    List(ListArgs),

    /// Manage evidence artifacts
    Evidence(EvidenceArgs),

    /// Run validation commands and manage the QA baseline
    Qa(QaArgs),

    /// Check a bundle against the live working tree
    Drift(DriftArgs),

    /// Manage quarantined bundles
    Quarantine(QuarantineArgs),

    /// Persist a bundle at the current schema version
    Migrate(MigrateArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Summarize the bundle store
    Status,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Task identifier
    pub task_id: String,

    /// Requirements text, or a file path when --from-file is set
    #[arg(short, long)]
    pub requirements: String,

    /// Treat --requirements as a file path to read
    #[arg(long)]
    pub from_file: bool,

    /// Plan step (repeatable, in order)
    #[arg(short = 's', long = "step", required = true)]
    pub plan_steps: Vec<String>,

    /// Standards reference in path#heading form (repeatable)
    #[arg(long = "standard", required = true)]
    pub standards_refs: Vec<String>,

    /// Source path the unit of work owns (repeatable)
    #[arg(short = 'p', long = "path", required = true)]
    pub source_paths: Vec<PathBuf>,
}

/// Arguments for the show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Task identifier
    pub task_id: String,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the evidence command
#[derive(Parser, Debug)]
pub struct EvidenceArgs {
    /// Subcommand for evidence
    #[command(subcommand)]
    pub action: EvidenceAction,
}

/// Evidence subcommands
#[derive(Subcommand, Debug)]
pub enum EvidenceAction {
    /// Attach a file or directory as evidence
    Attach {
        /// Task identifier
        task_id: String,

        /// Payload path
        path: PathBuf,

        /// Artifact kind: file, directory, archive, log, qa-output
        #[arg(short, long, default_value = "file")]
        kind: String,
    },

    /// List a bundle's evidence artifacts
    List {
        /// Task identifier
        task_id: String,

        /// Output format
        #[arg(short, long, default_value = "plain")]
        format: OutputFormat,
    },

    /// Re-hash a stored artifact and compare against its record
    Verify {
        /// Task identifier
        task_id: String,

        /// Artifact id (all artifacts when omitted)
        artifact_id: Option<String>,
    },
}

/// Arguments for the qa command
#[derive(Parser, Debug)]
pub struct QaArgs {
    /// Subcommand for qa
    #[command(subcommand)]
    pub action: QaAction,
}

/// QA subcommands
#[derive(Subcommand, Debug)]
pub enum QaAction {
    /// Execute validation commands from a definition file
    Run {
        /// Task identifier
        task_id: String,

        /// JSON file with the validation command list
        #[arg(long)]
        commands: PathBuf,
    },

    /// Record the latest results as the QA baseline
    Baseline {
        /// Task identifier
        task_id: String,
    },

    /// Compare the latest results against the baseline
    Drift {
        /// Task identifier
        task_id: String,
    },
}

/// Arguments for the drift command
#[derive(Parser, Debug)]
pub struct DriftArgs {
    /// Task identifier
    pub task_id: String,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the quarantine command
#[derive(Parser, Debug)]
pub struct QuarantineArgs {
    /// Subcommand for quarantine
    #[command(subcommand)]
    pub action: QuarantineAction,
}

/// Quarantine subcommands
#[derive(Subcommand, Debug)]
pub enum QuarantineAction {
    /// List quarantined bundles
    List,

    /// Release a bundle from quarantine
    Release {
        /// Task identifier
        task_id: String,

        /// Why the bundle is safe to use again
        #[arg(short, long)]
        justification: String,
    },
}

/// Arguments for the migrate command
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Task identifier
    pub task_id: String,

    /// Target schema version (defaults to the current version)
    #[arg(long = "to")]
    pub target: Option<u32>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for read commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Plain,
    /// JSON output
    Json,
}
