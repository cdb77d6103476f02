//! bootflash CLI - Command-line front end for the page bootloader flasher.
//!
//! ## Features
//!
//! - Inspect how a firmware image maps onto device pages
//! - Run complete flash sessions against a simulated bootloader, with
//!   scripted device faults
//! - Layered device profile configuration (files, environment, flags)
//! - Ctrl-C cancels a running session
//! - Shell completion generation

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

mod commands;
mod config;
mod progress;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to specific exit codes.
///
/// Exit codes: 0 success, 1 generic error, 2 usage error (clap),
/// 3 configuration error, 4 flash failed, 130 cancelled.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// The flash session ended in failure.
    #[error("flash failed: {0}")]
    FlashFailed(String),
    /// The user cancelled.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::FlashFailed(_) => 4,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Map an error chain to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<bootflash::Error>() {
        Some(bootflash::Error::Config(_)) => 3,
        _ => 1,
    }
}

/// bootflash - Flash robot firmware over a page-based bootloader.
///
/// Environment variables:
///   BOOTFLASH_PAGE_SIZE       - Bytes per flash page
///   BOOTFLASH_BASE_ADDRESS    - First flashable address (hex)
///   BOOTFLASH_FILL_BYTE       - Padding byte (hex)
///   BOOTFLASH_MAX_RETRIES     - Re-sends allowed per page
///   BOOTFLASH_ADDRESS_SPACE   - Flashable bytes (hex)
#[derive(Parser)]
#[command(name = "bootflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Bytes per flash page (power of two).
    #[arg(long, global = true, env = "BOOTFLASH_PAGE_SIZE")]
    page_size: Option<u32>,

    /// First flashable address (hex).
    #[arg(long, global = true, value_parser = parse_hex_u32, env = "BOOTFLASH_BASE_ADDRESS")]
    base_address: Option<u32>,

    /// Padding byte for partial pages (hex).
    #[arg(long, global = true, value_parser = parse_hex_u8, env = "BOOTFLASH_FILL_BYTE")]
    fill_byte: Option<u8>,

    /// Re-sends allowed per page.
    #[arg(long, global = true, env = "BOOTFLASH_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Flashable bytes starting at the base address (hex).
    #[arg(long, global = true, value_parser = parse_hex_u32, env = "BOOTFLASH_ADDRESS_SPACE")]
    address_space: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Firmware file formats accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Format {
    /// Raw binary placed at the base address.
    Bin,
    /// Intel HEX.
    Hex,
}

impl From<Format> for bootflash::ImageFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Bin => Self::Binary,
            Format::Hex => Self::IntelHex,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show how a firmware image maps onto device pages.
    Info {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Image format (guessed from the extension if omitted).
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// List every page address.
        #[arg(long)]
        pages: bool,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Flash an image into the simulated bootloader.
    Simulate {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Image format (guessed from the extension if omitted).
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// Index of a page the device rejects.
        #[arg(long)]
        fail_page: Option<usize>,

        /// How many times the failing page is rejected.
        #[arg(long, default_value = "1", requires = "fail_page")]
        fail_times: u32,

        /// Error code reported for the failing page.
        #[arg(long, default_value = "1", requires = "fail_page")]
        error_code: u16,

        /// Drop the link after this many page writes.
        #[arg(long)]
        disconnect_after: Option<usize>,

        /// Stale acknowledgments echoed before each page write completes.
        #[arg(long, default_value = "0")]
        stale_acks: usize,

        /// Print the session summary as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective device profile as TOML.
    Profile,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x00_80_00_00
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a hexadecimal byte (supports 0x prefix).
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| format!("Invalid hex byte: {e}"))
}

fn main() {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "bootflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // First Ctrl-C cancels the running session, the second one exits.
    if let Err(e) = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    bootflash::set_interrupt_checker(was_interrupted);

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info {
            firmware,
            format,
            pages,
            json,
        } => {
            let profile = config.device_profile(cli)?;
            commands::info::cmd_info(firmware, *format, &profile, *pages, *json)
        },
        Commands::Simulate {
            firmware,
            format,
            fail_page,
            fail_times,
            error_code,
            disconnect_after,
            stale_acks,
            json,
        } => {
            let profile = config.device_profile(cli)?;
            let plan = bootflash::FaultPlan {
                fail_page: *fail_page,
                fail_times: if fail_page.is_some() { *fail_times } else { 0 },
                error_code: *error_code,
                disconnect_after: *disconnect_after,
                stale_acks: *stale_acks,
            };
            commands::simulate::cmd_simulate(cli, firmware, *format, &profile, plan, *json)
        },
        Commands::Profile => {
            let profile = config.device_profile(cli)?;
            commands::profile::cmd_profile(&profile)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}
