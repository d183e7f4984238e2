//! Clap derive structures for the `hassdeck` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hassdeck -- a smart-home dashboard for Home Assistant, in your terminal
#[derive(Debug, Parser)]
#[command(
    name = "hassdeck",
    version,
    about = "Drive Home Assistant devices from the command line",
    long_about = "A terminal dashboard for Home Assistant.\n\n\
        Devices live in a local list mapped onto hub entities. Controls are\n\
        applied optimistically and confirmed (or rolled back) against the\n\
        state the hub reports.",
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
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HASSDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub URL (overrides profile)
    #[arg(long, short = 'u', env = "HASSDECK_URL", global = true)]
    pub url: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HASSDECK_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Directory holding the persisted device list, mapping and log
    #[arg(long, env = "HASSDECK_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HASSDECK_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HASSDECK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "HASSDECK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// List, inspect and sync dashboard devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Manage the device → entity mapping
    #[command(alias = "m")]
    Map(MapArgs),

    /// Drive a device control through a confirmed commit
    #[command(alias = "ctl", alias = "c")]
    Control(ControlArgs),

    /// Send remote-control (IR) keys
    #[command(alias = "r")]
    Remote(RemoteArgs),

    /// Stream device changes and IR telemetry
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Show the activity log
    Log(LogArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices
    #[command(alias = "ls")]
    List {
        /// Only devices in this room
        #[arg(long)]
        room: Option<String>,

        /// Only devices marked as common
        #[arg(long)]
        common: bool,

        /// Show the persisted list without contacting the hub
        #[arg(long)]
        local: bool,
    },

    /// Show one device in detail
    Show {
        /// Device ID
        id: u32,

        /// Show the persisted record without contacting the hub
        #[arg(long)]
        local: bool,
    },

    /// Pull hub state into the persisted device list
    Sync,

    /// Restore the default device list
    Reset,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MAPPING
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct MapArgs {
    #[command(subcommand)]
    pub command: MapCommand,
}

#[derive(Debug, Subcommand)]
pub enum MapCommand {
    /// List mapped devices
    #[command(alias = "ls")]
    List,

    /// Map a device to a hub entity
    Set {
        /// Device ID
        id: u32,

        /// Entity ID, e.g. "cover.living_room"
        entity: String,
    },

    /// Unmap a device
    #[command(alias = "rm")]
    Remove {
        /// Device ID
        id: u32,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONTROL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Give up and roll back after this many milliseconds without confirmation
    #[arg(long, global = true)]
    pub deadline_ms: Option<u64>,

    #[command(subcommand)]
    pub command: ControlCommand,
}

#[derive(Debug, Subcommand)]
pub enum ControlCommand {
    /// Set a curtain position (0-100)
    Position {
        id: u32,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        position: u8,
    },

    /// Set light brightness (0-255)
    Brightness {
        id: u32,
        brightness: u8,
    },

    /// Set light color temperature in mireds
    ColorTemp {
        id: u32,
        color_temp: u16,
    },

    /// Set a climate setpoint
    Setpoint {
        id: u32,
        temperature: f64,
    },

    /// Nudge a climate setpoint by a signed step, e.g. 0.5 or -1
    #[command(allow_negative_numbers = true)]
    Step {
        id: u32,
        delta: f64,
    },

    /// Set the HVAC mode ("off" powers the unit down)
    Mode {
        id: u32,
        mode: String,
    },

    /// Set the climate fan mode
    Fan {
        id: u32,
        fan_mode: String,
    },

    /// Set the climate swing mode
    Swing {
        id: u32,
        swing_mode: String,
    },

    /// Flip a device on or off (a curtain opens or closes)
    Toggle {
        id: u32,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REMOTE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub command: RemoteCommand,
}

#[derive(Debug, Subcommand)]
pub enum RemoteCommand {
    /// List the keys on the remote panel
    Keys,

    /// Send raw IR codes, one request each
    Send {
        /// Remote device ID
        id: u32,

        /// Codes to send, in order
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Press a panel key, with repeats debounced like the dashboard
    Press {
        /// Remote device ID
        id: u32,

        /// Key name (see `hassdeck remote keys`)
        key: String,

        /// How many times to press
        #[arg(long, short = 'n', default_value = "1")]
        times: u32,

        /// Pause between presses in milliseconds
        #[arg(long, default_value = "0")]
        gap_ms: u64,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH / LOG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only this device
    #[arg(long)]
    pub device: Option<u32>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Show at most this many entries
    #[arg(long, short = 'l', default_value = "20")]
    pub limit: usize,

    /// Empty the log
    #[arg(long)]
    pub clear: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key, e.g. "url" or "refresh_interval"
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store an access token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
