//! CLI entry point for taskrig
//!
//! Provides:
//! - Listing connected rig boards
//! - Listing and inspecting device configurations
//! - Running a polling session that logs rig events until Ctrl-C or a time limit
//!
//! # Usage
//!
//! ```bash
//! taskrig ports
//! taskrig devices
//! taskrig show-config rig_a
//! taskrig run --device rig_a --duration 600
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use taskrig::config::AppConfig;
use taskrig::device_config::{self, DeviceConfig};
use taskrig::poll_loop;
use taskrig::session::SessionLog;
use taskrig::tracing_setup;
use taskrig::{PollLoop, RigEvent};

#[derive(Parser)]
#[command(name = "taskrig")]
#[command(about = "Host controller for a serial behavioral task rig", long_about = None)]
struct Cli {
    /// Application config file
    #[arg(long, global = true, default_value = "config/taskrig.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports that belong to a rig board
    Ports,

    /// List available device configurations
    Devices,

    /// Print the resolved configuration of a device
    ShowConfig {
        /// Device id
        id: String,
    },

    /// Poll the rig and log events
    Run {
        /// Device id, overriding the config file
        #[arg(long)]
        device: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Do not write a session log
        #[arg(long)]
        no_log: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Devices => list_devices(&config),
        Commands::ShowConfig { id } => show_config(&config, &id),
        Commands::Run {
            device,
            duration,
            no_log,
        } => run(config, device, duration.map(Duration::from_secs), no_log).await,
    }
}

#[cfg(feature = "instrument_serial")]
fn list_ports() -> Result<()> {
    for port in taskrig::adapters::find_rig_ports()? {
        println!("{}", port.port_name);
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports() -> Result<()> {
    Err(taskrig::RigError::SerialFeatureDisabled.into())
}

fn list_devices(config: &AppConfig) -> Result<()> {
    let dir = &config.device.config_dir;
    for id in device_config::device_list(dir)
        .with_context(|| format!("reading {}", dir.display()))?
    {
        println!("{id}");
    }
    Ok(())
}

fn show_config(config: &AppConfig, id: &str) -> Result<()> {
    let device = DeviceConfig::load(&config.device.config_dir, id)?;
    println!("{}", toml::to_string_pretty(&device)?);
    Ok(())
}

#[cfg(feature = "instrument_serial")]
fn open_transport(config: &AppConfig) -> Result<taskrig::adapters::SerialTransport> {
    use taskrig::adapters::SerialTransport;

    let transport = match &config.serial.port {
        Some(port) => SerialTransport::open(port, config.serial.baud_rate)?,
        None => SerialTransport::open_first()?,
    };
    Ok(transport)
}

#[cfg(not(feature = "instrument_serial"))]
fn open_transport(_config: &AppConfig) -> Result<taskrig::adapters::MockTransport> {
    Err(taskrig::RigError::SerialFeatureDisabled.into())
}

async fn run(
    mut config: AppConfig,
    device: Option<String>,
    duration: Option<Duration>,
    no_log: bool,
) -> Result<()> {
    if let Some(device) = device {
        config.device.id = device;
    }
    let device = DeviceConfig::load(&config.device.config_dir, &config.device.id)
        .with_context(|| format!("loading device '{}'", config.device.id))?;

    let transport = open_transport(&config)?;
    let mut rig = PollLoop::new(transport, &device, &config.poll)?;
    if !no_log {
        let log = SessionLog::new(config.log_root()).with_config(&device)?;
        info!(path = %log.log_path()?.display(), "Session log");
        rig = rig.with_recorder(log);
    }

    let (handle, mut events, task) = poll_loop::spawn(rig, config.poll.event_channel_capacity);
    let limit = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(limit);

    let mut stopping = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RigEvent::Finished) | None => break,
                Some(event) => println!("{}", serde_json::to_string(&event)?),
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Interrupted, stopping");
                stopping = true;
                handle.stop().await?;
            }
            _ = &mut limit, if !stopping => {
                info!("Time limit reached, stopping");
                stopping = true;
                handle.stop().await?;
            }
        }
    }

    match task.await {
        Ok(result) => result.context("poll loop failed")?,
        Err(err) => warn!(error = %err, "Poll loop task aborted"),
    }
    Ok(())
}
