//! CareBot Gateway
//!
//! Serves operator clients over TCP and relays their route commands to the
//! delivery robot controller on the serial port.

use anyhow::Context;
use carebot_core::cli::{exit_code_description, run_console, CliResult};
use carebot_core::config::{self, GatewayConfig};
use carebot_core::core::logger;
use carebot_core::core::transport::{list_ports, SerialLink, VirtualLink};
use carebot_core::utils::discovery;
use carebot_core::Gateway;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing::{error, info};

/// CareBot Gateway
#[derive(Parser, Debug)]
#[command(
    name = "carebot-gateway",
    version,
    about = "TCP gateway for the CareBot delivery robot controller",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "CAREBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Controller serial port (skips auto-discovery)
    #[arg(short = 's', long)]
    serial_port: Option<String>,

    /// Controller baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Run against an in-memory controller that echoes every frame
    #[arg(long)]
    simulate: bool,

    /// Log level or filter directive
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print the effective configuration as TOML
    PrintConfig,
}

impl Cli {
    fn apply_overrides(&self, config: &mut GatewayConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(serial_port) = &self.serial_port {
            config.serial.port = Some(serial_port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match run(cli) {
        Ok(()) => CliResult::success(),
        Err(e) => CliResult::from_error(&e),
    };

    if let CliResult::Error(code, msg) = &result {
        eprintln!("Error: {msg}");
        eprintln!("({})", exit_code_description(*code));
    }
    result.to_exit_code()
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    match &cli.command {
        Some(Commands::ListPorts { detailed }) => return print_ports(*detailed),
        Some(Commands::PrintConfig) => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        None => {}
    }

    let _log_guard = logger::init(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let result = runtime.block_on(serve(config, cli.simulate));
    // The console may still be parked in a blocking stdin read
    runtime.shutdown_background();
    result
}

async fn serve(config: GatewayConfig, simulate: bool) -> anyhow::Result<()> {
    info!("Starting CareBot Gateway v{}", carebot_core::VERSION);
    if let Some(path) = config::config_file() {
        info!("Default config location: {}", path.display());
    }

    let link: Option<Box<dyn SerialLink>> = if simulate {
        let (link, controller) = VirtualLink::pair();
        controller.set_echo(true);
        info!("Using simulated controller");
        Some(Box::new(link))
    } else {
        discovery::connect_controller(&config.serial)
            .await
            .map(|link| Box::new(link) as Box<dyn SerialLink>)
    };

    let gateway = Gateway::new(&config, link)?;
    let listener = gateway.bind().await?;

    tokio::spawn(run_console(BufReader::new(tokio::io::stdin()), gateway.clone()));

    let signal_gateway = gateway.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                signal_gateway.shutdown();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    gateway.serve(listener).await?;

    let stats = gateway.stats();
    let link = gateway.link_stats();
    info!(
        "Gateway stopped: {} sessions, {} commands forwarded, {} rejected, {} telemetry lines, {} frames ({} bytes) written",
        stats.sessions_accepted,
        stats.commands_forwarded,
        stats.commands_rejected,
        stats.telemetry_lines,
        link.frames_written,
        link.bytes_written,
    );
    Ok(())
}

fn print_ports(detailed: bool) -> anyhow::Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    for port in &ports {
        if detailed {
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => println!(
                    "{}  USB {:04x}:{:04x} {} {}",
                    port.port_name,
                    usb.vid,
                    usb.pid,
                    usb.manufacturer.as_deref().unwrap_or("-"),
                    usb.product.as_deref().unwrap_or("-"),
                ),
                other => println!("{}  {:?}", port.port_name, other),
            }
        } else {
            println!("{}", port.port_name);
        }
    }
    Ok(())
}
