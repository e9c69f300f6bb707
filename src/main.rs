use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context};
use sysinfo::System;

use soundbus::audio_system::{FileLoader, SoundBus, SoundEvent, SoundOptions, SoundState};
use soundbus::config::BusConfig;
use soundbus::error::AppResult;
use soundbus::utils::FrameClock;

const LOG_TARGET_STARTUP: &str = "soundbus::startup";

fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Get log directory in user config folder
    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("SoundBus").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "soundbus.log");

    // Configure filter (info level by default)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    // In debug builds, also log to console
    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Logging to {}", log_dir.display());
}

fn log_runtime_environment() {
    let mut system = System::new_all();
    system.refresh_all();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting soundbus v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
    tracing::debug!(target: LOG_TARGET_STARTUP, "CPUs: {}", system.cpus().len());
}

fn print_usage() {
    eprintln!("Usage: soundbus <file> [volume] [fade_ms]");
    eprintln!();
    eprintln!("  volume   target volume, 0-200 (default 100)");
    eprintln!("  fade_ms  fade in/out duration in milliseconds (default from config)");
}

fn main() -> AppResult<()> {
    initialize_tracing();
    log_runtime_environment();

    let args: Vec<String> = std::env::args().collect();
    let Some(file) = args.get(1) else {
        print_usage();
        std::process::exit(2);
    };

    let config = match BusConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default configuration: {:#}", anyhow::Error::from(e));
            BusConfig::default()
        }
    };

    let volume = match args.get(2) {
        Some(value) => value
            .parse::<f64>()
            .with_context(|| format!("volume \"{}\" is not a number", value))?,
        None => 100.0,
    };
    let fade_ms = match args.get(3) {
        Some(value) => value
            .parse::<f64>()
            .with_context(|| format!("fade_ms \"{}\" is not a number", value))?,
        None => config.default_fade_ms,
    };

    play(file, volume, fade_ms, &config)
}

/// Play `file` once with a fade in and a fade out, then return
fn play(file: &str, volume: f64, fade_ms: f64, config: &BusConfig) -> AppResult<()> {
    let root = config.asset_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut bus = SoundBus::open_default(FileLoader::new(root), config);
    if !bus.is_enabled() {
        bail!("no audio output device available");
    }

    tracing::info!("Playing {}", config.asset_path(file).display());
    let id = bus.create_sound(SoundOptions::new(file).with_volume(0.0));

    let started = Rc::new(Cell::new(false));
    let started_flag = started.clone();
    bus.on(id, SoundEvent::Start, move |bus, id| {
        started_flag.set(true);
        let fade_in = bus.fade_request(volume).with_duration(fade_ms);
        bus.fade(id, fade_in);
    });
    bus.play(id);

    let fade_secs = fade_ms / 1000.0;
    let mut fading_out = false;
    let mut clock = FrameClock::new(config.frame_rate);

    while bus.is_alive(id) {
        bus.update(clock.tick());

        let duration = bus.info(id).and_then(|info| info.duration);
        let state = bus.sound(id).map(|sound| sound.state());
        if let (Some(duration), Some(SoundState::Playing)) = (duration, state) {
            let remaining = duration - bus.current_time(id);
            if !fading_out && remaining <= fade_secs {
                tracing::debug!("Fading out with {:.2}s left", remaining);
                let fade_out = bus.fade_request(0.0).with_duration(remaining.max(0.0) * 1000.0);
                bus.fade(id, fade_out);
                fading_out = true;
            }
        }

        clock.sleep_until_next_frame();
    }

    if !started.get() {
        bail!("could not play {}", file);
    }

    tracing::info!("Finished after {} frames", clock.frames());
    Ok(())
}
