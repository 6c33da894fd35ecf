// pianolights - MIDI keyboard to WLED LED strip bridge
// Every key played lights the LEDs above it; the lowest keys double as controls
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod animation;
mod colors;
mod config;
mod controls;
mod device;
mod engine;
mod httpd;
mod leds;
mod midi;
mod notes;
mod realtime;
mod types;

use config::{Args, PianoConfig};
use device::{DeviceState, WledClient};
use engine::{Engine, EngineHandle, EngineSettings};
use realtime::UdpLink;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pianolights=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn list_midi_ports() -> Result<()> {
    let ports = midi::list_midi_ports()?;
    if ports.is_empty() {
        println!("No MIDI input ports found");
        return Ok(());
    }
    println!("MIDI input ports:");
    for (i, name) in ports.iter().enumerate() {
        println!("  {}: {}", i, name);
    }
    Ok(())
}

async fn run(config: PianoConfig) -> Result<()> {
    // Nothing to do without a destination for the frames
    let link = UdpLink::dial(&config.wled_addr)
        .with_context(|| format!("WLED dial failed ({})", config.wled_addr))?;
    info!("Sending realtime frames to {}", link.addr());

    let client = WledClient::new(&config.wled_addr, Duration::from_millis(config.device_timeout_ms))?;
    debug!("WLED state API at {}", client.url());
    let device: Arc<dyn DeviceState> = Arc::new(client);

    let engine = Engine::new(
        EngineSettings::from_config(&config),
        config.lighting_state(),
        link,
        device.clone(),
    );
    let (handle, inbox) = EngineHandle::channel();
    let engine_task = tokio::spawn(engine.run(inbox));

    // MIDI callbacks run on midir's thread, outside the runtime
    let midi_handle = handle.clone();
    let on_message = move |_timestamp: u64, message: &[u8], _: &mut ()| {
        let frame = midi::normalize_midi_message(message);
        if let Some(event) = midi::parse_midi_message(&frame) {
            if let Err(e) = midi_handle.midi_blocking(event) {
                debug!("MIDI event dropped: {}", e);
            }
        }
    };
    let (port_name, midi_connection) = if config.virtual_midi {
        midi::create_virtual_midi(on_message)?
    } else {
        midi::connect_midi(&config.midi_device, on_message)?
    };
    info!("Listening to MIDI port: {}", port_name);

    if config.http_enabled {
        let app = httpd::AppState {
            engine: handle.clone(),
            device: device.clone(),
        };
        let ip = config.http_ip.clone();
        let port = config.http_port;
        tokio::spawn(async move {
            if let Err(e) = httpd::run_http_server(ip, port, app).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    // Ctrl+C / SIGTERM: lights off before exiting
    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install signal handler")?;

    stop_rx.recv().await;
    info!("Shutting down...");
    midi_connection.close();

    if let Err(e) = handle.shutdown().await {
        warn!("{}", e);
    }
    engine_task.await?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    if args.list_midi {
        return list_midi_ports();
    }

    // Get config file path (custom or default)
    let cfg_arg = args.cfg.as_deref();
    let config_path = PianoConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    // Load existing config or create default, then merge with command line args
    let mut config = if config_file_exists {
        match PianoConfig::load_with_path(cfg_arg) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config file {}: {:#}", config_path.display(), e);
                error!("Please fix the config file or delete it to regenerate with defaults.");
                return Err(e);
            }
        }
    } else {
        // No config file - use defaults (will be saved below)
        let mut default_config = PianoConfig::default();
        default_config.config_path = Some(config_path.clone());
        default_config
    };

    let args_provided = config.merge_with_args(&args);

    // Save config ONLY if it doesn't exist yet or command-line args need persisting
    if !config_file_exists || args_provided {
        config.save()?;
    }

    info!("Using config file: {}", config_path.display());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}
