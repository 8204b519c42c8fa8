use anyhow::Result;
use clap::Parser;
use moodcam::{
    ControlCommand, KeyboardInputHandler, MoodcamConfig, SessionBuilder, SessionState, SessionView,
};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "moodcam")]
#[command(about = "Live facial emotion readout from a camera feed")]
#[command(version)]
#[command(long_about = "Samples frames from a camera, sends them to an emotion inference \
service over Socket.IO and prints the dominant emotion with per-emotion confidences. \
Without an inference endpoint the confidences are simulated.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "moodcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Inference service URL, overriding the configuration file
    #[arg(
        short,
        long,
        value_name = "URL",
        help = "Inference service URL (e.g. http://localhost:5000)"
    )]
    endpoint: Option<String>,

    /// Seed for the simulated random walk
    #[arg(long, help = "Seed for reproducible simulated results")]
    seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS", help = "Run for a fixed number of seconds, then stop")]
    duration: Option<u64>,

    /// Read start/stop/reset/quit keys from the terminal
    #[arg(short, long, help = "Enable keyboard controls (s = start/stop, r = reset, q = quit)")]
    interactive: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting moodcam v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match MoodcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(endpoint) = &args.endpoint {
        config.transport.endpoint = Some(endpoint.clone());
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    debug!("Effective configuration:\n{}", config.to_toml()?);

    let mut session = SessionBuilder::new().config(config).build().map_err(|e| {
        error!("Failed to create session: {}", e);
        e
    })?;

    // Text observer of the rendered surface
    let mut view = session.subscribe();
    let observer = tokio::spawn(async move {
        let mut last = String::new();
        while view.changed().await.is_ok() {
            let line = render_view(&view.borrow_and_update());
            if line != last {
                print!("{}\r\n", line);
                let _ = std::io::stdout().flush();
                last = line;
            }
        }
    });

    let (commands, mut command_rx) = mpsc::unbounded_channel();

    let keyboard = if args.interactive {
        let handler = KeyboardInputHandler::new(commands.clone());
        handler.start().await?;
        Some(handler)
    } else {
        None
    };

    {
        let commands = commands.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                let _ = commands.send(ControlCommand::Quit);
            }
        });
    }

    if let Some(secs) = args.duration {
        let commands = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("Run duration of {}s elapsed", secs);
            let _ = commands.send(ControlCommand::Quit);
        });
    }

    let mut exit_code = 0;
    if let Err(e) = session.start().await {
        error!("Failed to start session: {}", e);
        if keyboard.is_none() {
            exit_code = 1;
            let _ = commands.send(ControlCommand::Quit);
        }
    }

    while let Some(command) = command_rx.recv().await {
        match command {
            ControlCommand::Toggle => match session.state() {
                SessionState::Active | SessionState::Acquiring => session.stop().await,
                SessionState::Idle | SessionState::Stopped => {
                    if let Err(e) = session.start().await {
                        warn!("Start failed: {}", e);
                    }
                }
            },
            ControlCommand::Reset => {
                if let Err(e) = session.reset().await {
                    warn!("Reset failed: {}", e);
                }
            }
            ControlCommand::Quit => break,
        }
    }

    session.stop().await;

    if let Some(keyboard) = keyboard {
        keyboard.stop().await?;
    }
    observer.abort();

    let stats = session.stats();
    info!(
        "Session summary: {} frames sampled, {} sent, {} results, \
         {} inference failures, {} channel errors",
        stats.frames_sampled,
        stats.frames_sent,
        stats.results_applied,
        stats.inference_failures,
        stats.channel_errors
    );

    std::process::exit(exit_code);
}

/// One line per change of the rendered surface
fn render_view(view: &SessionView) -> String {
    let mut line = format!("[{:?}] ", view.state);

    if view.busy {
        line.push_str("acquiring camera...");
        return line;
    }

    match &view.snapshot.dominant {
        Some(dominant) => {
            let scores: Vec<String> =
                view.snapshot.scores.iter().map(ToString::to_string).collect();
            line.push_str(&format!("{} | {}", dominant, scores.join("  ")));
        }
        None => line.push_str(view.status_line()),
    }

    line
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("moodcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Moodcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[camera]
# Camera device index (e.g., 0 for /dev/video0)
index = 0
# Preferred facing direction: "user" or "environment"
facing_mode = "user"
# Ideal resolution (width, height); the device may grant another
resolution = [640, 480]
# Frames per second requested from the device
fps = 30

[sampler]
# Sampling interval while streaming to the inference service
remote_interval_ms = 500
# Sampling interval in simulated mode
simulated_interval_ms = 1000
# JPEG quality factor (1-100)
jpeg_quality = 80

[transport]
# Inference service URL; leave unset to simulate results
# endpoint = "http://localhost:5000"
# Socket.IO mount path on the service
path = "/socket.io/"
# Bound on the initial connection
connect_timeout_ms = 5000
# Reconnection attempts after an established connection drops
reconnect_attempts = 5
# Base reconnection delay, multiplied by the attempt number
reconnect_delay_ms = 1000

[simulation]
# Seed for a reproducible random walk
# seed = 42

[system]
# Event bus capacity
event_bus_capacity = 100
"#;

    println!("{}", default_config);
}
