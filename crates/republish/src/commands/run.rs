//! `run`: connect, start the service, wait for a shutdown signal.

use republish_config::Settings;
use republish_core::Service;
use republish_mqtt::MqttTransport;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::CliError;

pub async fn handle(settings: &Settings) -> Result<(), CliError> {
    let runtime = settings.runtime_config()?;
    let mqtt = settings.mqtt_config()?;

    info!(
        host = %mqtt.host,
        port = mqtt.port,
        source = %runtime.source,
        root = %runtime.output_root,
        "starting republisher"
    );

    let service = Service::new(runtime);
    let cancel = CancellationToken::new();
    let (transport, ingress) =
        MqttTransport::connect(&mqtt, &service.subscriptions(), &cancel).await?;

    if let Err(e) = service.start(ingress, transport.commands()).await {
        transport.shutdown().await;
        return Err(e.into());
    }

    shutdown_signal().await;

    service.shutdown().await;
    transport.shutdown().await;
    cancel.cancel();
    info!("republisher stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
