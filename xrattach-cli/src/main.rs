//! xrattach CLI - Command-line tool for bringing up XRadio Bluetooth chips.
//!
//! ## Features
//!
//! - Full bring-up: power, handshake, firmware download, HCI setup,
//!   line-discipline attach
//! - Firmware-only download for development loops
//! - Device address inspection and regeneration
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use xrattach::bdaddr::{self, DEFAULT_BDADDR_FILE};
use xrattach::bringup::{Bringup, BringupOptions, DEFAULT_FIRMWARE};
use xrattach::chip::{ChipConfig, ChipVariant};
use xrattach::detect::detect_ports;
use xrattach::platform::lpm::LpmControl;
use xrattach::platform::rfkill::Rfkill;
use xrattach::port::{NativePort, SerialConfig};

mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler; polled by the library's long-running loops.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// CLI-level failures that carry their own exit code class.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Usage or setup problem, exit code 2.
    #[error("{0}")]
    Usage(String),
    /// User cancelled, exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

/// xrattach - Bring up XRadio Bluetooth chips (XR819/XR829) over UART.
///
/// Environment variables:
///   XRATTACH_PORT              - Default serial port
///   XRATTACH_CHIP              - Default chip variant (aw1722, aw1732)
///   XRATTACH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "xrattach")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "XRATTACH_PORT")]
    port: Option<String>,

    /// Target chip variant.
    #[arg(short, long, global = true, env = "XRATTACH_CHIP")]
    chip: Option<Chip>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "XRATTACH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Supported chip variants.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Chip {
    /// AW1722 module (XR819, default).
    Aw1722,
    /// AW1732 module (XR829).
    Aw1732,
}

impl From<Chip> for ChipVariant {
    fn from(chip: Chip) -> Self {
        match chip {
            Chip::Aw1722 => ChipVariant::Aw1722,
            Chip::Aw1732 => ChipVariant::Aw1732,
        }
    }
}

/// Firmware and link parameters shared by `attach` and `load`.
#[derive(Args, Debug)]
struct LinkArgs {
    /// Firmware image (defaults to the stock image path).
    firmware: Option<PathBuf>,

    /// Working baud rate for the firmware download.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Baud rate the boot ROM starts at.
    #[arg(long, default_value = "115200")]
    initial_baud: u32,

    /// RAM address the image is written to.
    #[arg(long, value_parser = parse_hex_u32)]
    load_addr: Option<u32>,

    /// Entry point the chip jumps to after loading.
    #[arg(long, value_parser = parse_hex_u32)]
    jump_addr: Option<u32>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Bring the chip up completely and attach it to the kernel.
    Attach {
        #[command(flatten)]
        link: LinkArgs,

        /// Skip the HCI reset after the firmware boots.
        #[arg(long)]
        no_reset: bool,

        /// Keep the HCI link at the initial baud rate.
        #[arg(long)]
        keep_baud: bool,

        /// Do not program a device address.
        #[arg(long)]
        no_bdaddr: bool,

        /// Device address file.
        #[arg(long, value_name = "PATH")]
        bdaddr_file: Option<PathBuf>,

        /// Do not hand the tty to the kernel's HCI line discipline.
        #[arg(long)]
        no_ldisc: bool,

        /// Enable low-power mode once the link is up.
        #[arg(long)]
        lpm: bool,
    },

    /// Download the firmware and jump, nothing more.
    Load {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Show or regenerate the persistent device address.
    Bdaddr {
        /// Device address file.
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Generate and store a fresh address.
        #[arg(long)]
        regenerate: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

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

fn main() {
    match run() {
        Ok(()) => {},
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            let code = match e.downcast_ref::<CliError>() {
                Some(CliError::Usage(_)) => 2,
                Some(CliError::Cancelled(_)) => 130,
                None => 1,
            };
            std::process::exit(code);
        },
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // NO_COLOR and TTY detection
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if std::env::var("NO_COLOR").is_ok() || !stderr_is_tty {
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
        "xrattach v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Ctrl-C aborts the retry loops in the library
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed))
        .context("Failed to install Ctrl-C handler")?;
    xrattach::set_interrupt_checker(|| INTERRUPTED.load(Ordering::Relaxed));

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Attach {
            link,
            no_reset,
            keep_baud,
            no_bdaddr,
            bdaddr_file,
            no_ldisc,
            lpm,
        } => {
            let mut options = bringup_options(link, &config);
            options.startup_reset = !*no_reset;
            options.update_hci_baud = !*keep_baud;
            options.set_bdaddr = !*no_bdaddr;
            options.attach_line_discipline = !*no_ldisc;
            options.enable_lpm = *lpm || config.bringup.lpm;
            if let Some(path) = bdaddr_file.clone().or_else(|| config.bringup.bdaddr_file.clone()) {
                options.bdaddr_file = path;
            }
            cmd_bringup(&cli, &config, link, options)?;
        },
        Commands::Load { link } => {
            let mut options = bringup_options(link, &config);
            options.startup_reset = false;
            options.update_hci_baud = false;
            options.set_bdaddr = false;
            options.attach_line_discipline = false;
            cmd_bringup(&cli, &config, link, options)?;
        },
        Commands::Bdaddr { file, regenerate } => {
            cmd_bdaddr(file.as_deref(), &config, *regenerate)?;
        },
        Commands::ListPorts { json } => {
            cmd_list_ports(*json);
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
        },
    }

    Ok(())
}

/// Get serial port from CLI args or interactive selection.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;
    Ok(selected.name)
}

/// Resolve the chip variant from CLI, config or the default.
fn resolve_variant(cli: &Cli, config: &Config) -> Result<ChipVariant> {
    if let Some(chip) = cli.chip {
        return Ok(chip.into());
    }
    if let Some(name) = &config.firmware.chip {
        return ChipVariant::from_name(name).ok_or_else(|| {
            CliError::Usage(format!("unknown chip variant in config: {name}")).into()
        });
    }
    Ok(ChipVariant::default())
}

/// Base bring-up options from link arguments and configuration.
fn bringup_options(link: &LinkArgs, config: &Config) -> BringupOptions {
    let firmware = link
        .firmware
        .clone()
        .or_else(|| config.firmware.path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIRMWARE));

    let mut options = BringupOptions::new(firmware);
    options.working_baud = link
        .baud
        .or(config.connection.baud)
        .unwrap_or(options.working_baud);
    options.default_baud = link.initial_baud;
    options
}

/// Shared body of `attach` and `load`.
fn cmd_bringup(
    cli: &Cli,
    config: &Config,
    link: &LinkArgs,
    options: BringupOptions,
) -> Result<()> {
    let variant = resolve_variant(cli, config)?;
    let mut chip = ChipConfig::new(variant);
    if let Some(addr) = link.load_addr.or(config.firmware.load_addr) {
        chip.load_addr = addr;
    }
    if let Some(addr) = link.jump_addr.or(config.firmware.jump_addr) {
        chip.jump_addr = addr;
    }

    let port_name = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).green(),
            options.default_baud
        );
    }

    let serial_config = SerialConfig::new(&port_name, options.default_baud);
    let mut port = NativePort::open(&serial_config)
        .with_context(|| format!("Failed to open serial port {port_name}"))?;
    let mut power = Rfkill::discover().context("Failed to find the Bluetooth rfkill device")?;
    let mut wake = LpmControl::new();

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("firmware");
        pb
    };

    let mut session = Bringup::new(&mut port, &mut power, &mut wake, chip, options);
    session.run(&mut |sent, total| {
        pb.set_length(total as u64);
        pb.set_position(sent as u64);
    })?;
    pb.finish_with_message("done");

    if !cli.quiet {
        eprintln!("\n{} Chip is up", style("🎉").green().bold());
    }

    Ok(())
}

/// Bdaddr command implementation.
fn cmd_bdaddr(file: Option<&Path>, config: &Config, regenerate: bool) -> Result<()> {
    let path = file
        .map(Path::to_path_buf)
        .or_else(|| config.bringup.bdaddr_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BDADDR_FILE));

    let addr = if regenerate {
        let addr = bdaddr::generate();
        bdaddr::store(&path, &addr)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        addr
    } else {
        bdaddr::load_or_generate(&path)
    };

    println!("{addr}");
    Ok(())
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "bridge": p.bridge.name(),
                    "known": p.bridge.is_known(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("no serial ports found").dim());
        return;
    }

    for port in &detected {
        let bridge_type = if port.bridge.is_known() {
            format!(" [{}]", style(port.bridge.name()).yellow())
        } else {
            String::new()
        };

        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            bridge_type,
            vid_pid,
            product
        );
    }

    if let Ok(auto_port) = xrattach::detect::auto_detect_port() {
        eprintln!(
            "\n{} Would auto-select {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        // Verifies that all derive macros produce a valid clap Command
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_attach() {
        let cli = Cli::try_parse_from([
            "xrattach",
            "--port",
            "/dev/ttyS1",
            "attach",
            "fw_xr829_bt.bin",
            "--baud",
            "1500000",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyS1"));
        if let Commands::Attach { link, .. } = cli.command {
            assert_eq!(link.firmware.as_deref().unwrap().to_str(), Some("fw_xr829_bt.bin"));
            assert_eq!(link.baud, Some(1_500_000));
            assert_eq!(link.initial_baud, 115_200);
        } else {
            panic!("Expected Attach command");
        }
    }

    #[test]
    fn test_cli_parse_attach_with_all_flags() {
        let cli = Cli::try_parse_from([
            "xrattach",
            "attach",
            "--no-reset",
            "--keep-baud",
            "--no-bdaddr",
            "--no-ldisc",
            "--lpm",
            "--bdaddr-file",
            "/tmp/xr_bt.conf",
            "--load-addr",
            "0x1000",
            "--jump-addr",
            "0x1000",
        ])
        .unwrap();
        if let Commands::Attach {
            link,
            no_reset,
            keep_baud,
            no_bdaddr,
            bdaddr_file,
            no_ldisc,
            lpm,
        } = cli.command
        {
            assert!(link.firmware.is_none());
            assert_eq!(link.load_addr, Some(0x1000));
            assert_eq!(link.jump_addr, Some(0x1000));
            assert!(no_reset);
            assert!(keep_baud);
            assert!(no_bdaddr);
            assert!(no_ldisc);
            assert!(lpm);
            assert_eq!(bdaddr_file.unwrap().to_str(), Some("/tmp/xr_bt.conf"));
        } else {
            panic!("Expected Attach command");
        }
    }

    #[test]
    fn test_cli_parse_load() {
        let cli = Cli::try_parse_from(["xrattach", "load", "fw.bin"]).unwrap();
        if let Commands::Load { link } = cli.command {
            assert_eq!(link.firmware.as_deref().unwrap().to_str(), Some("fw.bin"));
            assert!(link.baud.is_none());
        } else {
            panic!("Expected Load command");
        }
    }

    #[test]
    fn test_cli_parse_bdaddr() {
        let cli = Cli::try_parse_from(["xrattach", "bdaddr", "--regenerate"]).unwrap();
        if let Commands::Bdaddr { file, regenerate } = cli.command {
            assert!(file.is_none());
            assert!(regenerate);
        } else {
            panic!("Expected Bdaddr command");
        }
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["xrattach", "list-ports", "--json"]).unwrap();
        if let Commands::ListPorts { json } = cli.command {
            assert!(json);
        } else {
            panic!("Expected ListPorts command");
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["xrattach", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["xrattach", "list-ports"]).unwrap();
        assert!(cli.port.is_none());
        assert!(cli.chip.is_none());
        assert!(!cli.quiet);
        assert!(!cli.non_interactive);
        assert!(!cli.confirm_port);
        assert!(!cli.list_all_ports);
        assert!(cli.config_path.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "xrattach",
            "--port",
            "COM3",
            "--chip",
            "aw1732",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--confirm-port",
            "--list-all-ports",
            "--config",
            "/tmp/config.toml",
            "list-ports",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert!(matches!(cli.chip, Some(Chip::Aw1732)));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
        assert!(cli.confirm_port);
        assert!(cli.list_all_ports);
    }

    #[test]
    fn test_cli_missing_subcommand() {
        let result = Cli::try_parse_from(["xrattach"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_chip() {
        let result = Cli::try_parse_from(["xrattach", "--chip", "ws63", "list-ports"]);
        assert!(result.is_err());
    }

    // ---- parse_hex_u32 ----

    #[test]
    fn test_parse_hex_u32_with_prefix() {
        assert_eq!(parse_hex_u32("0x00010000").unwrap(), 0x0001_0000);
        assert_eq!(parse_hex_u32("0X00010000").unwrap(), 0x0001_0000);
    }

    #[test]
    fn test_parse_hex_u32_without_prefix() {
        assert_eq!(parse_hex_u32("DEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_hex_u32("ff").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_with_underscores() {
        assert_eq!(parse_hex_u32("0x00_01_00_00").unwrap(), 0x0001_0000);
    }

    #[test]
    fn test_parse_hex_u32_with_whitespace() {
        assert_eq!(parse_hex_u32("  0xFF  ").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_invalid() {
        assert!(parse_hex_u32("not_hex").is_err());
        assert!(parse_hex_u32("0xGG").is_err());
    }

    #[test]
    fn test_parse_hex_u32_overflow() {
        assert!(parse_hex_u32("0x1FFFFFFFF").is_err());
    }

    #[test]
    fn test_parse_hex_u32_zero() {
        assert_eq!(parse_hex_u32("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u32("0").unwrap(), 0);
    }

    // ---- Chip conversion ----

    #[test]
    fn test_chip_to_chip_variant() {
        assert_eq!(ChipVariant::from(Chip::Aw1722), ChipVariant::Aw1722);
        assert_eq!(ChipVariant::from(Chip::Aw1732), ChipVariant::Aw1732);
    }

    // ---- option resolution ----

    #[test]
    fn test_bringup_options_prefer_cli_over_config() {
        let link = LinkArgs {
            firmware: Some(PathBuf::from("custom.bin")),
            baud: Some(921_600),
            initial_baud: 115_200,
            load_addr: None,
            jump_addr: None,
        };
        let mut config = Config::default();
        config.firmware.path = Some(PathBuf::from("/lib/firmware/other.bin"));
        config.connection.baud = Some(1_500_000);

        let options = bringup_options(&link, &config);
        assert_eq!(options.firmware.to_str(), Some("custom.bin"));
        assert_eq!(options.working_baud, 921_600);
    }

    #[test]
    fn test_bringup_options_fall_back_to_defaults() {
        let link = LinkArgs {
            firmware: None,
            baud: None,
            initial_baud: 115_200,
            load_addr: None,
            jump_addr: None,
        };
        let options = bringup_options(&link, &Config::default());
        assert_eq!(options.firmware.to_str(), Some(DEFAULT_FIRMWARE));
        assert_eq!(options.working_baud, 1_500_000);
        assert_eq!(options.default_baud, 115_200);
    }
}
