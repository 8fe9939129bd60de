use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;

use tv_volume_keeper::audio::{CaptureConfig, LevelMonitor, SampleWidth};
use tv_volume_keeper::config::Config;
use tv_volume_keeper::range_detector::Boundaries;
use tv_volume_keeper::tv_remote::{Key, RemoteEvent, RemoteIdentity, TvRemote, DEFAULT_WAKE_REPEAT};
use tv_volume_keeper::volume_controller::VolumeController;

const WAKE_PROBE_DELAY: Duration = Duration::from_millis(2000);

#[derive(Parser)]
#[command(name = "tv-volume-keeper", version, about = "Keeps the TV volume inside a loudness band")]
struct Cli {
    /// TV address, overrides the built-in default
    #[arg(long, env = "TVVOL_IP")]
    ip: Option<String>,

    /// Log every frame exchanged with the TV at info level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List capture devices with the index `run` expects
    Devices,
    /// Watch the microphone and steer the TV volume
    Run {
        #[arg(long)]
        device: Option<usize>,
        /// TV volume right now; the controller counts from here
        #[arg(long)]
        volume: Option<i32>,
        #[arg(long)]
        max_volume: Option<i32>,
    },
    /// Send one key, e.g. `KEY_MUTE` or `volup`
    Press { key: Key },
    /// Type text into the focused input field
    Type { text: String },
    /// Send Wake-on-LAN packets
    Wake,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::new().map_err(anyhow::Error::msg)?;

    match cli.command {
        Command::Devices => list_devices(),
        Command::Run {
            device,
            volume,
            max_volume,
        } => {
            let (remote, events) = build_remote(&config, &cli.ip, cli.debug)?;
            run(
                &config,
                remote,
                events,
                device.unwrap_or(config.audio_device_index),
                volume.unwrap_or(config.control_initial_volume),
                max_volume.unwrap_or(config.control_max_volume),
            )
            .await
        }
        Command::Press { key } => {
            let (remote, _events) = build_remote(&config, &cli.ip, cli.debug)?;
            bring_up(&config, &remote).await?;
            let sent = remote.press(key).await;
            finish(&remote, sent).await
        }
        Command::Type { text } => {
            let (remote, _events) = build_remote(&config, &cli.ip, cli.debug)?;
            bring_up(&config, &remote).await?;
            let sent = remote.type_text(&text).await;
            finish(&remote, sent).await
        }
        Command::Wake => {
            let (remote, _events) = build_remote(&config, &cli.ip, cli.debug)?;
            remote.turn_on(DEFAULT_WAKE_REPEAT).await?;
            println!("Sent {} WOL packets", DEFAULT_WAKE_REPEAT);
            Ok(())
        }
    }
}

fn list_devices() -> Result<()> {
    for (index, device) in LevelMonitor::devices()?.iter().enumerate() {
        println!("{:>3}  {}", index, device);
    }
    Ok(())
}

fn build_remote(
    config: &Config,
    ip: &Option<String>,
    debug: bool,
) -> Result<(TvRemote, mpsc::Receiver<RemoteEvent>)> {
    let ip = ip.as_deref().unwrap_or(config.tv_ip_addr);
    let identity = RemoteIdentity::new(config.tv_app_name, ip, config.tv_mac_addr)?
        .with_port(config.tv_port)
        .with_status_port(config.tv_status_port)
        .with_subnet(config.tv_subnet)?
        .with_token(load_token(config.token_file))
        .with_debug(debug || config.tv_debug);

    let (tx, rx) = mpsc::channel(16);
    Ok((TvRemote::new(identity, tx), rx))
}

/// Token from the previous run, so the TV does not ask to pair again.
fn load_token(path: impl AsRef<Path>) -> Option<String> {
    let content = std::fs::read_to_string(path.as_ref()).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        log::info!("Loaded token from {}", path.as_ref().display());
        Some(trimmed.to_string())
    }
}

fn save_token(path: impl AsRef<Path>, token: &str) {
    match std::fs::write(path.as_ref(), token) {
        Ok(()) => log::info!("Saved token to {}", path.as_ref().display()),
        Err(e) => log::error!("Failed to save token to {}: {}", path.as_ref().display(), e),
    }
}

/// Probe, wake the TV if it is off, probe again, then connect.
async fn bring_up(config: &Config, remote: &TvRemote) -> Result<Option<String>> {
    if !remote.is_on(Duration::ZERO).await {
        log::info!("TV is off, waking it up");
        remote.turn_on(DEFAULT_WAKE_REPEAT).await?;
        if !remote.is_on(WAKE_PROBE_DELAY).await {
            anyhow::bail!("TV did not turn on");
        }
    }

    let stored = remote.identity().token.clone();
    let token = remote.connect().await;
    match &token {
        Some(token) if stored.as_deref() != Some(token.as_str()) => {
            save_token(config.token_file, token);
        }
        Some(_) => {}
        None => log::warn!("TV has not authorized this remote yet, accept the dialog and retry"),
    }
    Ok(token)
}

async fn finish(remote: &TvRemote, sent: bool) -> Result<()> {
    remote.close().await;
    if sent {
        Ok(())
    } else {
        anyhow::bail!("TV did not take the command")
    }
}

async fn run(
    config: &Config,
    remote: TvRemote,
    mut rx_remote_event: mpsc::Receiver<RemoteEvent>,
    device_index: usize,
    volume: i32,
    max_volume: i32,
) -> Result<()> {
    bring_up(config, &remote).await?;
    let remote = Arc::new(remote);

    // 麦克风电平通道
    let (tx_level, mut rx_level) = mpsc::channel::<f64>(32);
    let capture = CaptureConfig {
        sample_rate: config.audio_sample_rate,
        channels: config.audio_channels,
        sample_width: SampleWidth::from_bits(config.audio_sample_bits)
            .with_context(|| format!("Unsupported sample width: {}", config.audio_sample_bits))?,
    };
    let mut monitor = LevelMonitor::open(device_index, &capture, tx_level)?;
    monitor.set_scale(config.audio_scale);
    log::info!("Listening on {}", monitor.device());
    match monitor.properties() {
        Ok(properties) => {
            for (name, value) in properties {
                log::info!("  {}: {}", name, value);
            }
        }
        Err(e) => log::debug!("No mixer controls: {}", e),
    }
    monitor.start()?;

    // 音量变化通道
    let (tx_volume, mut rx_volume) = mpsc::channel::<i32>(32);
    let bounds = Boundaries::new(
        config.control_low,
        config.control_high,
        config.control_low_hysteresis,
        config.control_high_hysteresis,
    )?;
    let mut controller =
        VolumeController::new(remote.clone(), bounds, tx_volume).with_monitor(monitor);
    controller.set_current_volume(volume);
    controller.set_max_volume(max_volume);

    println!(
        "Keeping level within {:.0}..{:.0}, volume {} (max {})",
        bounds.low(),
        bounds.high(),
        volume,
        max_volume
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(level) = rx_level.recv() => {
                controller.handle_level(level).await;
            }

            Some(volume) = rx_volume.recv() => {
                println!("Volume: {}", volume);
            }

            Some(event) = rx_remote_event.recv() => {
                match event {
                    RemoteEvent::Disconnected => {
                        log::warn!("TV disconnected");
                        // The TV drops the channel when it goes to standby.
                        if remote.is_on(WAKE_PROBE_DELAY).await {
                            if let Some(token) = remote.connect().await {
                                log::info!("Reconnected to TV");
                                save_token(config.token_file, &token);
                            }
                        }
                    }
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
