use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info};

use midimonster::backend::MidiBackend;
use midimonster::config::{self, Config};
use midimonster::routing::{Router, RoutingTable, TxRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    info!("Loaded configuration from {config_path}");

    let running = Arc::new(AtomicBool::new(true));
    let shutdown_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        shutdown_flag.store(false, Ordering::SeqCst);
    })
    .context("failed to install shutdown handler")?;

    let mut backend = MidiBackend::start(&config)?;

    // deliveries come back out of the router as transmit requests handled
    // after each drain
    let (requests_tx, requests_rx) = crossbeam_channel::unbounded::<TxRequest>();
    let mut router = RoutingTable::new(requests_tx);
    for mapping in &config.mapping {
        let (from_name, from_channel) = config::parse_endpoint(&mapping.from)?;
        let (to_name, to_channel) = config::parse_endpoint(&mapping.to)?;
        let from_instance = backend
            .instance_id(from_name)
            .with_context(|| format!("mapping references unknown instance {from_name}"))?;
        let to_instance = backend
            .instance_id(to_name)
            .with_context(|| format!("mapping references unknown instance {to_name}"))?;
        let from = router
            .lookup(from_instance, from_channel, true)
            .with_context(|| format!("failed to register channel {}", mapping.from))?;
        let to = router
            .lookup(to_instance, to_channel, true)
            .with_context(|| format!("failed to register channel {}", mapping.to))?;
        router.map(from, to);
        info!("Mapped {} -> {}", mapping.from, mapping.to);
    }

    info!("Entering main loop");
    while running.load(Ordering::SeqCst) {
        match backend.poll(POLL_INTERVAL) {
            Ok(true) => {
                if let Err(e) = backend.process(&mut router) {
                    error!("Failed to process queued events: {e}");
                }
                for request in requests_rx.try_iter() {
                    backend.transmit(request.instance, request.channel, request.value);
                }
            }
            Ok(false) => {}
            Err(e) => {
                error!("Wakeup pipe failure: {e}");
                break;
            }
        }
    }

    backend.shutdown();
    info!("Service has shut down gracefully.");
    Ok(())
}
