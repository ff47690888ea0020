use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use husky_teleop_runtime::api::{self, AppState};
use husky_teleop_runtime::bridge::{self, Ack, RobotClient, TemplateEvent};
use husky_teleop_runtime::clock::{Clock, MonotonicClock};
use husky_teleop_runtime::config::{
    BRIDGE_CONTEXT_INTERVAL, DEFAULT_API_TIMEOUT, DEFAULT_API_URL, HTTP_BIND, HTTP_PORT, LOOP_HZ, RuntimeConfig,
    VEHICLE_LABEL,
};
use husky_teleop_runtime::control::CommandStore;
use husky_teleop_runtime::messages::Pose;
use husky_teleop_runtime::runtime::{self, ControlLoop, ShutdownSignal};
use husky_teleop_runtime::sim::KinematicSim;
use husky_teleop_runtime::telemetry::Telemetry;
use husky_teleop_runtime::zenoh_link;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "husky-teleop-runtime", about = "Teleoperation runtime for a simulated Husky base")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop and the network API (default)
    Serve(ServeArgs),
    /// Read template events as JSON lines on stdin and drive the API
    Bridge(BridgeArgs),
}

#[derive(Args, Clone)]
struct ServeArgs {
    #[arg(long, default_value = HTTP_BIND)]
    bind: String,
    #[arg(long, default_value_t = HTTP_PORT)]
    port: u16,
    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ)]
    hz: u32,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    spawn_x: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    spawn_y: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    spawn_yaw: f64,
    /// Engine label of the vehicle body
    #[arg(long, default_value = VEHICLE_LABEL)]
    label: String,
    /// Also serve commands and telemetry over zenoh
    #[arg(long)]
    zenoh: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            bind: HTTP_BIND.to_string(),
            port: HTTP_PORT,
            hz: LOOP_HZ,
            spawn_x: 0.0,
            spawn_y: 0.0,
            spawn_yaw: 0.0,
            label: VEHICLE_LABEL.to_string(),
            zenoh: false,
        }
    }
}

#[derive(Args)]
struct BridgeArgs {
    #[arg(long, env = "HUSKY_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    /// Request timeout in seconds
    #[arg(long, env = "HUSKY_API_TIMEOUT", default_value_t = DEFAULT_API_TIMEOUT.as_secs_f64())]
    timeout: f64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging (RUST_LOG wins over --log); stdout stays free for bridge acks
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Command::Bridge(args)) => run_bridge(args).await,
        Some(Command::Serve(args)) => serve(args).await,
        None => serve(ServeArgs::default()).await,
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> Result<(), BoxError> {
    let config = RuntimeConfig {
        loop_hz: args.hz,
        vehicle_label: args.label.clone(),
        spawn_pose: Pose::new(args.spawn_x, args.spawn_y, args.spawn_yaw),
        ..RuntimeConfig::default()
    };

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let commands = Arc::new(CommandStore::new(Arc::clone(&clock)));
    let telemetry = Arc::new(Telemetry::new(config.spawn_pose, Arc::clone(&commands)));
    let shutdown = ShutdownSignal::new();

    let engine = KinematicSim::new(&config);
    let vehicle = engine.vehicle();
    let control = ControlLoop::new(
        engine,
        vehicle,
        Arc::clone(&commands),
        Arc::clone(&telemetry),
        clock,
        config,
    );
    let loop_handle = runtime::spawn(control, shutdown.clone())?;

    if args.zenoh {
        let (commands, telemetry, shutdown) = (Arc::clone(&commands), Arc::clone(&telemetry), shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = zenoh_link::run(commands, telemetry, shutdown).await {
                error!("Zenoh link failed: {}", e);
            }
        });
    }

    let state = AppState::new(commands, telemetry);
    let served = serve_api(&args, state, shutdown.clone()).await;

    // Covers the server exiting for reasons other than the signal
    shutdown.trigger();
    let stats = tokio::task::spawn_blocking(move || loop_handle.join())
        .await?
        .map_err(|_| "control loop thread panicked")?;
    info!("Final loop stats: {:?}", stats);
    served
}

async fn serve_api(args: &ServeArgs, state: AppState, shutdown: ShutdownSignal) -> Result<(), BoxError> {
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("REST controls ready on http://{}", addr);
    info!("  POST /drive      {{\"vx\":0.6,\"wz\":0.0,\"duration\":2}}");
    info!("  POST /turn_left  {{\"rate\":1.2,\"duration\":1.0}}");
    info!("  POST /stop");
    info!("  GET  /pose");

    api::serve(listener, state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
        shutdown.trigger();
    })
    .await?;
    Ok(())
}

async fn run_bridge(args: BridgeArgs) -> Result<(), BoxError> {
    let timeout = Duration::try_from_secs_f64(args.timeout).unwrap_or(DEFAULT_API_TIMEOUT);
    let client = RobotClient::new(&args.api_url, timeout)?;

    match client.health().await {
        Ok(_) => info!("Runtime reachable at {}", client.base_url()),
        Err(e) => warn!("Runtime not reachable yet at {}: {}", client.base_url(), e),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // First tick fires immediately, so the context goes out at startup too
    let mut context = tokio::time::interval(BRIDGE_CONTEXT_INTERVAL);

    loop {
        tokio::select! {
            _ = context.tick() => {
                let payload = bridge::context_payload(client.pose().await);
                println!("{}", payload);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let ack = match serde_json::from_str::<TemplateEvent>(line) {
                    Ok(event) => bridge::handle_event(&client, &event).await,
                    Err(e) => {
                        warn!("[bridge] Unreadable event: {}", e);
                        Ack::nack()
                    }
                };
                println!("{}", serde_json::to_string(&ack)?);
            }
        }
    }

    info!("Input closed, stopping robot");
    if let Err(e) = client.stop().await {
        warn!("Failed to stop robot: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_failure_still_stops_the_loop() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let args = ServeArgs {
            port: taken.local_addr().unwrap().port(),
            ..ServeArgs::default()
        };

        // An error return means the loop thread was told to stop and joined
        let result = tokio::time::timeout(Duration::from_secs(5), serve(args))
            .await
            .expect("serve hung after failing to bind");
        assert!(result.is_err());
    }

    #[test]
    fn test_bridge_reads_api_settings_from_env() {
        // SAFETY: no other test in this binary touches these variables
        unsafe {
            std::env::set_var("HUSKY_API_URL", "http://10.0.0.7:5000");
            std::env::set_var("HUSKY_API_TIMEOUT", "2.5");
        }
        let cli = Cli::try_parse_from(["husky-teleop-runtime", "bridge"]).unwrap();
        let Some(Command::Bridge(args)) = cli.command else {
            panic!("expected the bridge subcommand");
        };
        assert_eq!(args.api_url, "http://10.0.0.7:5000");
        assert_eq!(args.timeout, 2.5);

        // Flags still win over the environment
        let cli = Cli::try_parse_from(["husky-teleop-runtime", "bridge", "--timeout", "1"]).unwrap();
        let Some(Command::Bridge(args)) = cli.command else {
            panic!("expected the bridge subcommand");
        };
        assert_eq!(args.timeout, 1.0);
    }
}
