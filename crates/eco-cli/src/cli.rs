//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "eco")]
#[command(author, version, about = "CLI for Danfoss Eco radiator thermostats", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the config file
    #[arg(long, global = true, env = "ECO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device name or address, or use ECO_DEVICE env var
    #[arg(short, long, env = "ECO_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Secret key (32 hex characters), or use ECO_SECRET_KEY env var
    #[arg(long, env = "ECO_SECRET_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// PIN code (4 digits)
    #[arg(long)]
    pub pin: Option<String>,
}

/// A writable setting of the valve
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Setting {
    /// Target temperature in °C (5.0-30.0)
    TargetTemperature,
    /// Lowest temperature selectable on the valve, in °C (5.0-30.0)
    TemperatureMin,
    /// Highest temperature selectable on the valve, in °C (5.0-30.0)
    TemperatureMax,
    /// Frost protection temperature in °C (5.0-10.0)
    FrostProtection,
    /// Vacation temperature in °C (5.0-20.0)
    VacationTemperature,
    /// Lock the buttons on the valve (on/off)
    ChildSafety,
    /// Let the valve learn how fast the room heats up (on/off)
    AdaptiveLearning,
    /// Operating mode (manual, scheduled, vacation, hold)
    Mode,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read every property from a valve
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change a setting on a valve
    Set {
        #[command(flatten)]
        device: DeviceArgs,

        /// Setting to change
        #[arg(value_enum)]
        setting: Setting,

        /// New value (°C for temperatures, on/off for switches, a mode name for mode)
        value: String,
    },

    /// Set the valve clock to the local time
    SyncClock {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read the secret key of a valve in pairing mode
    Pair {
        #[command(flatten)]
        device: DeviceArgs,

        /// Store the key (and device) in the config file
        #[arg(long)]
        save: bool,
    },

    /// Refresh a valve periodically until Ctrl+C
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Seconds between refreshes
        #[arg(short, long)]
        interval: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
