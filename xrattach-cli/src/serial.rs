//! Interactive serial port selection.
//!
//! Resolution order: explicit `--port`, configured port, then detected
//! ports. With several candidates an interactive picker runs; in
//! non-interactive mode anything but exactly one candidate fails fast.

use std::cmp::Ordering;
use std::io::IsTerminal;

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme};
use log::{debug, info};
use xrattach::detect::{DetectedPort, UsbBridge, detect_ports};

use crate::CliError;
use crate::config::Config;

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized port.
    pub confirm_port: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures map to exit code 2 so scripts can branch on them.
    CliError::Usage(message.to_string()).into()
}

fn select_non_interactive_port(selection_ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    // Non-interactive mode must be deterministic and never prompt.
    match selection_ports.len().cmp(&1) {
        Ordering::Equal => {
            let port = selection_ports
                .into_iter()
                .next()
                .expect("selection_ports has exactly 1 element here");
            Ok(port)
        },
        Ordering::Greater => Err(usage_err(
            "multiple serial ports found, specify one with --port",
        )),
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<DetectedPort> {
    // If port explicitly specified, use it
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    // If port in config, use it
    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = detect_ports();

    if ports.is_empty() {
        return Err(usage_err("no serial ports found"));
    }

    // Prefer known USB-UART bridges unless the user asks for all
    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| p.bridge.is_known())
        .cloned()
        .collect();

    let selection_ports: Vec<DetectedPort> = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(selection_ports);
    }

    match selection_ports.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(selection_ports)
        },
        Ordering::Equal => {
            let port = selection_ports
                .into_iter()
                .next()
                .expect("selection_ports has exactly 1 element here");

            if port.bridge.is_known() && !options.confirm_port {
                info!("Auto-selected port: {} [{}]", port.name, port.bridge.name());
                Ok(port)
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            }
        },
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "interactive port selection needs a terminal; use --port or --non-interactive"
                .to_string(),
        )
        .into())
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                CliError::Usage("port selection prompt failed".to_string()).into()
            }
        },
    }
}

/// Find a port by name.
fn find_port_by_name(name: &str) -> DetectedPort {
    let ports = detect_ports();

    // Try exact match first
    if let Some(port) = ports.iter().find(|p| p.name == name) {
        return port.clone();
    }

    // Try case-insensitive match (Windows)
    if let Some(port) = ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
        return port.clone();
    }

    // Not in the detected list, but the user asked for it by name. Board
    // UARTs like /dev/ttyS1 often do not enumerate.
    DetectedPort {
        name: name.to_string(),
        bridge: UsbBridge::Unknown,
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
        serial: None,
    }
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    eprintln!(
        "{} {} serial ports detected",
        style("ℹ").blue(),
        ports.len()
    );

    // Sort: known bridges first
    ports.sort_by_key(|p| !p.bridge.is_known());

    let port_names: Vec<String> = ports
        .iter()
        .map(|port| {
            let name = if port.bridge.is_known() {
                style(&port.name).bold().to_string()
            } else {
                port.name.clone()
            };

            let bridge_info = if port.bridge.is_known() {
                format!(" [{}]", style(port.bridge.name()).yellow())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };

            let product = port
                .product
                .as_ref()
                .map(|p| format!(" - {}", style(p).dim()))
                .unwrap_or_default();

            format!("{name}{bridge_info}{product}")
        })
        .collect();

    // Truncate labels to the terminal width so items never wrap.
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let port_names: Vec<String> = port_names
        .into_iter()
        .map(|n| console::truncate_str(&n, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&port_names)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: DetectedPort) -> Result<DetectedPort> {
    let product_info = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use port {}{product_info}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(port)
    } else {
        Err(CliError::Cancelled("port selection cancelled".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknown_port(name: &str) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            bridge: UsbBridge::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    // ---- SerialOptions ----

    #[test]
    fn test_serial_options_default() {
        let options = SerialOptions::default();
        assert!(options.port.is_none());
        assert!(!options.list_all_ports);
        assert!(!options.non_interactive);
        assert!(!options.confirm_port);
    }

    #[test]
    fn test_serial_options_with_port() {
        let options = SerialOptions {
            port: Some("/dev/ttyS1".to_string()),
            ..Default::default()
        };
        assert_eq!(options.port.as_deref(), Some("/dev/ttyS1"));
    }

    // ---- explicit port names ----

    #[test]
    fn test_find_port_by_name_keeps_unenumerated_name() {
        let port = find_port_by_name("/dev/ttyS1-definitely-not-enumerated");
        assert_eq!(port.name, "/dev/ttyS1-definitely-not-enumerated");
        assert_eq!(port.bridge, UsbBridge::Unknown);
    }

    // ---- non-interactive error mapping ----

    #[test]
    fn test_select_non_interactive_multiple_ports_returns_usage_error() {
        let ports = vec![unknown_port("/dev/ttyUSB0"), unknown_port("/dev/ttyUSB1")];

        let result = select_non_interactive_port(ports);
        let err = result.err().expect("expected error");
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_select_non_interactive_no_ports_returns_usage_error() {
        let result = select_non_interactive_port(vec![]);
        let err = result.err().expect("expected error");
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_select_non_interactive_single_port_is_selected() {
        let selected = select_non_interactive_port(vec![unknown_port("/dev/ttyUSB0")]).unwrap();
        assert_eq!(selected.name, "/dev/ttyUSB0");
    }
}
