//! Cync CLI - Command-line interface for the Cync hub
//!
//! Connect to the relay, watch device state, and send one-off commands.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use cync_hub::{Hub, HubEvent, LightHandle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::CliConfig;

/// How long `set` waits for the relay before giving up
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Cync - control lights through the Cync cloud relay
#[derive(Parser)]
#[command(name = "cync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true, env = "CYNC_CONFIG", default_value = "cync.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, register every configured device and print state changes
    Listen,

    /// Send one command to a device
    Set {
        /// Device ID
        device_id: u32,

        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Action {
    On,
    Off,
    /// Brightness in percent
    Brightness { value: u8 },
    /// Color temperature in mireds
    Temp { mired: u16 },
    /// Hue in degrees
    Hue { degrees: f64 },
    /// Saturation in percent
    Saturation { percent: f64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = CliConfig::load(&cli.config)?;

    match cli.command {
        Commands::Listen => listen(config).await,
        Commands::Set { device_id, action } => set(config, device_id, action).await,
    }
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn start_hub(config: &CliConfig) -> Result<Hub> {
    let hub = Hub::builder()
        .config(config.hub.clone())
        .static_credentials(config.credentials.user_id, &config.credentials.authorize)
        .spawn()?;
    Ok(hub)
}

async fn listen(config: CliConfig) -> Result<()> {
    let mut hub = start_hub(&config)?;
    let handle = hub.handle();

    println!(
        "{} Connecting to {}",
        "CYNC".cyan().bold(),
        config.hub.relay_addr()
    );

    let mut lights = Vec::new();
    for (home, device) in config.devices() {
        let light = handle.register_device(device.clone(), home.clone()).await?;
        lights.push(light);
    }
    info!("Registered {} devices", lights.len());

    loop {
        tokio::select! {
            event = hub.next_event() => {
                let Some(event) = event else { break };
                print_event(&lights, &event);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    hub.shutdown().await;
    println!("{}", "Stopped".yellow());
    Ok(())
}

fn print_event(lights: &[LightHandle], event: &HubEvent) {
    match event {
        HubEvent::Connected => println!("{} connected", "OK".green().bold()),
        HubEvent::Disconnected => println!("{} disconnected", "--".yellow()),
        HubEvent::AuthenticationFailed { code } => {
            println!("{} authentication rejected (code {})", "ERR".red().bold(), code)
        }
        HubEvent::ConnectionFailed { reason } => {
            println!("{} {}", "ERR".red().bold(), reason)
        }
        HubEvent::CharacteristicChanged {
            device_id,
            characteristic,
        } => {
            let name = lights
                .iter()
                .find(|l| l.device_id() == *device_id)
                .map(|l| l.device().display_name.as_str())
                .unwrap_or("?");
            println!("{} {} {:?}", name.cyan(), device_id, characteristic);
        }
    }
}

async fn set(config: CliConfig, device_id: u32, action: Action) -> Result<()> {
    let (home, device) = config
        .find_device(device_id)
        .with_context(|| format!("Device {} is not in the config", device_id))?;

    let mut hub = start_hub(&config)?;
    let light = hub
        .handle()
        .register_device(device.clone(), home.clone())
        .await?;

    tokio::time::timeout(COMMAND_TIMEOUT, hub.wait_connected())
        .await
        .context("Timed out connecting to relay")??;

    match action {
        Action::On => light.set_on(true)?,
        Action::Off => light.set_on(false)?,
        Action::Brightness { value } => light.set_brightness(value)?,
        Action::Temp { mired } => light.set_color_temperature(mired)?,
        Action::Hue { degrees } => light.set_hue(degrees)?,
        Action::Saturation { percent } => light.set_saturation(percent)?,
    }

    // connected, so an empty queue means the command was handed to the socket
    let status = hub.handle().status().await?;
    if status.queued > 0 {
        warn!("{} packets still queued", status.queued);
        bail!("Command was not sent");
    }

    println!(
        "{} {} {:?}",
        "OK".green().bold(),
        device.display_name,
        light.state()
    );
    hub.shutdown().await;
    Ok(())
}
