use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use catalog::{load_records, Catalog};
use clap::Parser;
use device::{DeviceGateway, SimulatedDeviceGateway};
use relay_core::{
    connect_event_channel, event_channel_url, DispatchEngine, EngineExit, EventSink,
};
use shared::protocol::OutboundEvent;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, RelaySettings};

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relays trigger events to a haptic feedback device")]
struct Args {
    /// Path to a file containing sensation options for the device.
    #[arg(short = 's', long = "sensation-file")]
    sensation_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(path) = args.sensation_file {
        settings.sensation_file = Some(path);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        server_url = %settings.server_url,
        sensation_file = ?settings.sensation_file,
        "relay: starting"
    );

    let device: Arc<dyn DeviceGateway> = Arc::new(SimulatedDeviceGateway::new());
    match run_relay(settings, device).await {
        Ok(EngineExit::Stopped { reason }) => {
            info!(%reason, "relay: stopped");
            Ok(())
        }
        Ok(EngineExit::ChannelClosed) => {
            warn!("relay: event channel closed");
            Ok(())
        }
        Err(error) => {
            error!("relay: fatal startup error: {error:#}");
            Err(error)
        }
    }
}

async fn run_relay(
    settings: RelaySettings,
    device: Arc<dyn DeviceGateway>,
) -> Result<EngineExit> {
    let url = event_channel_url(&settings.server_url)?;
    info!(%url, "relay: attempting to connect to event channel");
    let (sink, lanes) = connect_event_channel(&url).await?;
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let records = load_records(settings.sensation_file.as_deref());
    let catalog = Arc::new(Catalog::build(records).context("failed to build sensation catalog")?);
    for uuid in catalog.rejected() {
        sink.emit(OutboundEvent::SensationParsingError { uuid: uuid.clone() })
            .await?;
    }

    info!(slots = catalog.len(), "relay: attempting to connect to device");
    device
        .configure(catalog.configuration())
        .await
        .context("failed to configure device sensations")?;
    let connection = device
        .auto_connect()
        .await
        .context("failed to connect to device")?;
    info!(%connection, "relay: device connected");
    sink.emit(OutboundEvent::OwoConnected).await?;

    DispatchEngine::new(catalog, device, sink).run(lanes).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
