// Keyboard teleop over zenoh: W/S drive, A/D turn, R/F speed, Q quit
// Start the runtime with `--zenoh` first.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use husky_teleop_runtime::config::{TOPIC_CMD_BASE, TOPIC_POSE};
use husky_teleop_runtime::messages::{BaseCommand, Pose};
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [0.3, 0.6, 1.2]; // m/s
const TURN_RATES: [f64; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 150; // Zero velocities after this much time with no input
const CMD_TTL: f64 = 0.25; // Expiry attached to every command, in seconds

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&session, &publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    session: &zenoh::Session,
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pose_sub = session.declare_subscriber(TOPIC_POSE).await?;
    let mut speed_idx: usize = 0;

    let mut vx = 0.0;
    let mut wz = 0.0;
    let mut last_movement_input = Instant::now();
    let mut last_pose_log = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        vx = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        vx = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        wz = TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        wz = -TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            vx = 0.0;
            wz = 0.0;
        }

        // Commands carry a short expiry, so a crashed teleop stops the robot
        let cmd = BaseCommand {
            vx,
            wz,
            duration: Some(CMD_TTL),
        };
        publisher.put(serde_json::to_string(&cmd)?).await?;

        // Keep only the newest pose, print it once a second
        let mut latest = None;
        while let Ok(Some(sample)) = pose_sub.try_recv() {
            latest = serde_json::from_slice::<Pose>(&sample.payload().to_bytes()).ok();
        }
        if let Some(pose) = latest {
            if last_pose_log.elapsed() > Duration::from_secs(1) {
                info!("Pose: x={:.2} y={:.2} yaw={:.2}\r", pose.x, pose.y, pose.yaw);
                last_pose_log = Instant::now();
            }
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
