// Zenoh transport: base commands in, pose and health out
// Runs next to the HTTP API and, like it, only touches the command store and
// telemetry; the control loop never waits on this task.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{TELEMETRY_HZ, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_POSE};
use crate::control::CommandStore;
use crate::messages::BaseCommand;
use crate::runtime::ShutdownSignal;
use crate::telemetry::Telemetry;

/// Parse a command payload and store it
pub fn apply_command(commands: &CommandStore, payload: &[u8]) -> Result<BaseCommand, serde_json::Error> {
    let cmd = serde_json::from_slice::<BaseCommand>(payload)?;
    let vx = if cmd.vx.is_finite() { cmd.vx } else { 0.0 };
    let wz = if cmd.wz.is_finite() { cmd.wz } else { 0.0 };
    commands.set(vx, wz, cmd.duration);
    Ok(cmd)
}

pub async fn run(
    commands: Arc<CommandStore>,
    telemetry: Arc<Telemetry>,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / TELEMETRY_HZ));

    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!("Publishing to: {}, {} at {}Hz", TOPIC_POSE, TOPIC_HEALTH, TELEMETRY_HZ);

    while !shutdown.is_triggered() {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), last one wins
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Err(e) = apply_command(&commands, &payload) {
                warn!("Failed to parse command: {}", e);
            }
        }

        // 2. Publish the latest telemetry
        let state = telemetry.state();
        pub_pose.put(serde_json::to_string(&state.pose)?).await?;
        pub_health.put(serde_json::to_string(&state.health)?).await?;
    }

    info!("Closing Zenoh session");
    session.close().await?;
    Ok(())
}
