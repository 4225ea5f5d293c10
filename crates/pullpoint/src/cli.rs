//! Clap derive structures for the `pullpoint` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use pullpoint_core::{DeviceId, Label, Transition};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pullpoint -- ONVIF pull-point event engine
#[derive(Debug, Parser)]
#[command(
    name = "pullpoint",
    version,
    about = "Turn ONVIF camera analytics into recorder triggers",
    long_about = "Inspect and exercise the pullpoint event engine.\n\n\
        Devices come from the [[devices]] table of the config file; triggers\n\
        are written to the recorder trigger file and/or posted over HTTP.\n\n\
        The engine itself (subscription manager and fleet watcher) is the\n\
        pullpoint-core library. A host service embeds it and supplies the\n\
        ONVIF Connector; this binary does not open camera connections.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "PULLPOINT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PULLPOINT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the configuration file
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// List registry devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Inspect event topic classification
    #[command(alias = "t")]
    Topics(TopicsArgs),

    /// Emit a manual trigger through the configured sink
    Trigger(TriggerArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration (file + environment)
    Show,

    /// Print the config file path
    Path,

    /// Store the recorder API token in the system keyring
    ///
    /// Prompts for the token on a terminal; otherwise reads one line from
    /// stdin. Stored tokens are used when neither trigger.token_env nor
    /// PULLPOINT_RECORDER_TOKEN is set.
    SetToken,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices eligible for event subscriptions
    #[command(alias = "ls")]
    List {
        /// Include disabled devices and devices with events turned off
        #[arg(long, short = 'a')]
        all: bool,
    },
}

// ── Topics ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TopicsArgs {
    #[command(subcommand)]
    pub command: TopicsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TopicsCommand {
    /// Classify one or more event topics
    Classify {
        /// Topic strings as reported by the camera
        #[arg(required = true)]
        topics: Vec<String>,
    },

    /// List the effective supported-topic allow-list
    Supported,
}

// ── Trigger ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// Device id from the registry
    pub device: DeviceId,

    /// Detection label (Person, Vehicle, Animal, motion)
    pub label: Label,

    /// Transition (start or stop)
    pub transition: Transition,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
