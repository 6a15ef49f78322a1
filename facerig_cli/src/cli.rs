//! CLI argument definitions and shared statics.

use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "facerig", version, about = "Animatronic face rig controller")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Calibration CSV (strict header `channel,min,max,mid`) imported before the command
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// JSON calibration store; overrides `[calibration] path`
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Log and print results as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serial port of the controller board; overrides config and the saved port
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Talk to the in-process simulated board instead of a serial port
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a motion script (neutral pass before and after)
    #[command(group(ArgGroup::new("source").required(true).args(["script", "named"])))]
    Run {
        /// Script file
        script: Option<PathBuf>,
        /// Script saved in the library under this name
        #[arg(long, value_name = "NAME")]
        named: Option<String>,
    },
    /// List every line a script run would skip, without connecting
    Check { script: PathBuf },
    /// Move one channel (coupled partners follow)
    Move {
        #[arg(long)]
        channel: u8,
        #[arg(long, allow_hyphen_values = true)]
        angle: i32,
    },
    /// Read `<channel> <angle>` lines from stdin and send them debounced
    Live,
    /// Edit one calibration value
    Calibrate {
        #[arg(long)]
        channel: u8,
        /// min | max | mid
        #[arg(long)]
        field: String,
        #[arg(long, allow_hyphen_values = true)]
        value: i32,
    },
    /// Open calibration windows back to 0..=180
    #[command(group(ArgGroup::new("which").required(true).args(["channel", "all"])))]
    ResetWindow {
        #[arg(long)]
        channel: Option<u8>,
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Print the board's STATUS reply
    Status,
    /// Send every channel to its neutral angle
    Reset,
    /// Print the board's HELP reply
    HelpDevice,
    /// Quick health check (config, calibration, and the link when one is given)
    SelfCheck,
    /// Write an expression walkthrough script for the current calibration
    Generate {
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Manage saved scripts
    Library {
        #[command(subcommand)]
        cmd: LibraryCmd,
    },
    /// List serial ports
    Ports,
}

#[derive(Subcommand, Debug)]
pub enum LibraryCmd {
    List,
    /// Save a script file under a name (blank names save as "untitled")
    Save { name: String, file: PathBuf },
}
