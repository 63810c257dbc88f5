/// Whistle alarm service binary
///
/// Listens to the microphone (or replays a WAV file) and raises the alarm
/// when a sustained whistle is detected.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whistle_alarm::backend::{CpalInput, DesktopNotifier, LedStrobe, NoStrobe, RodioPlayback, WavFileInput};
use whistle_alarm::{
    AlarmDispatcher, AudioInput, ListenerConfig, Playback, Sensitivity, Strobe, WhistleListener,
};

const APP_NAME: &str = "whistle-alarm";

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Raise an alarm when a sustained whistle is heard")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detection sensitivity: low, medium, high (or 1-3)
    #[arg(short, long, value_name = "LEVEL")]
    sensitivity: Option<Sensitivity>,

    /// Do not pulse the strobe light
    #[arg(long)]
    no_flash: bool,

    /// Fire the alarm once and exit
    #[arg(long)]
    test_alert: bool,

    /// Replay a WAV file instead of listening to the microphone
    #[arg(long, value_name = "WAV")]
    replay: Option<PathBuf>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("whistle_alarm=info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        for name in CpalInput::device_names()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let dispatcher = Arc::new(build_dispatcher(&config));
    let alert = config.alert_config();

    let (input, replay_duration): (Box<dyn AudioInput>, Option<Duration>) = match &cli.replay {
        Some(path) => {
            let input = WavFileInput::open(path)?.realtime(true);
            let duration = input.duration();
            (Box::new(input), Some(duration))
        }
        None => (Box::new(CpalInput::new(config.input_device.clone())), None),
    };

    let mut listener = WhistleListener::new(input, Arc::clone(&dispatcher))
        .with_buffer_size(config.buffer_size)
        .with_keep_alive(config.keep_alive);

    if cli.test_alert {
        let report = listener.test_alert(alert).await?;
        info!(
            "Test alert: sound={:?}, flash={:?}, notification={:?}",
            report.sound, report.flash, report.notification
        );
        return Ok(());
    }

    info!("Starting WhistleFinder");

    start_listening(&mut listener, &config).await?;

    match replay_duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration + Duration::from_secs(1)) => {
                    info!("Replay finished");
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to wait for Ctrl+C")?;
                }
            }
        }
        None => {
            info!("Listening for whistles. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to wait for Ctrl+C")?;
        }
    }

    listener.stop().await;

    let stats = listener.stats();
    info!(
        "Stopped: {} buffers analysed, {} whistles detected, {} alarms raised, {} dropped",
        stats.frames_processed, stats.whistles_detected, stats.alarms_fired, stats.events_dropped
    );

    Ok(())
}

/// Load configuration: file and environment, then command line flags
fn load_config(cli: &Cli) -> Result<ListenerConfig> {
    let mut config = ListenerConfig::load(cli.config.as_deref())?;

    if let Some(sensitivity) = cli.sensitivity {
        config.sensitivity = sensitivity;
    }
    if cli.no_flash {
        config.flash_enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Start the listener; a failure unwinds `main` so backends shut down cleanly
async fn start_listening(listener: &mut WhistleListener, config: &ListenerConfig) -> Result<()> {
    listener
        .start(config.sensitivity, config.alert_config())
        .await
        .context("Failed to start listening")
}

fn build_dispatcher(config: &ListenerConfig) -> AlarmDispatcher {
    let playback: Arc<dyn Playback> = match RodioPlayback::new(config.sounds_dir.clone()) {
        Ok(playback) => Arc::new(playback),
        Err(e) => {
            warn!("Sound playback disabled: {}", e);
            Arc::new(SilentPlayback)
        }
    };

    let strobe: Arc<dyn Strobe> = match &config.strobe_led {
        Some(path) => match LedStrobe::open(path) {
            Ok(strobe) => Arc::new(strobe),
            Err(e) => {
                warn!("Strobe disabled: {}", e);
                Arc::new(NoStrobe)
            }
        },
        None => Arc::new(NoStrobe),
    };

    let notifier = Arc::new(DesktopNotifier::new(APP_NAME));

    AlarmDispatcher::new(playback, strobe, notifier)
        .with_cooldown(config.cooldown())
        .with_flash_duration(config.flash_duration())
}

/// Playback used when the playback thread cannot be started
struct SilentPlayback;

impl Playback for SilentPlayback {
    fn play_once(&self, _sound: &str) -> Result<(), whistle_alarm::AlertError> {
        Err(whistle_alarm::AlertError::ResourceUnavailable(
            "Sound playback disabled".to_string(),
        ))
    }

    fn play_loop(&self, sound: &str, _volume: f32) -> Result<(), whistle_alarm::AlertError> {
        self.play_once(sound)
    }

    fn stop_all(&self) -> Result<(), whistle_alarm::AlertError> {
        Ok(())
    }
}
