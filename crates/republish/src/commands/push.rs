//! `push-sensors`: validate a sensor table locally, then publish it to the
//! config update topic.

use std::time::Duration;

use republish_config::Settings;
use republish_core::{Topics, encode_sensor_table, parse_sensor_table};
use republish_mqtt::{ConnectionState, MqttTransport};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::PushSensorsArgs;
use crate::error::CliError;

pub async fn handle(args: &PushSensorsArgs, settings: &Settings) -> Result<(), CliError> {
    let raw = tokio::fs::read(&args.file).await?;
    let table =
        parse_sensor_table(&raw).map_err(|e| CliError::sensor_table(args.file.clone(), &e))?;

    let runtime = settings.runtime_config()?;
    let topics = Topics::new(&runtime.output_root, &runtime.source, runtime.layout);
    info!(entries = table.len(), file = %args.file.display(), "sensor table is valid");

    if args.dry_run {
        println!("{} entries OK, would publish to {}", table.len(), topics.update);
        return Ok(());
    }

    let payload = encode_sensor_table(&table).map_err(|e| CliError::Runtime {
        message: format!("cannot encode sensor table: {e}"),
    })?;

    let mqtt = settings.mqtt_config()?;
    let cancel = CancellationToken::new();
    let (transport, _ingress) = MqttTransport::connect(&mqtt, &[], &cancel).await?;

    let mut state = transport.connection_state();
    let connected = matches!(
        tokio::time::timeout(
            Duration::from_secs(args.timeout),
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await,
        Ok(Ok(_))
    );
    if !connected {
        transport.shutdown().await;
        return Err(CliError::Timeout {
            operation: format!("connection to {}:{}", mqtt.host, mqtt.port),
            seconds: args.timeout,
        });
    }

    let published = transport.publish(&topics.update, payload, false).await;
    transport.shutdown().await;
    published?;

    println!("Published {} entries to {}", table.len(), topics.update);
    Ok(())
}
