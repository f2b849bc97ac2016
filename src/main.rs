use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rover_link_runtime::config::{
    AT_TIMEOUT, BAUD_CANDIDATES, BURST_DURATION, DEFAULT_BAUD, DEFAULT_CRUISE_DUTY, DEFAULT_PORT,
    PROBE_WINDOW, RuntimeConfig,
};
use rover_link_runtime::link;
use rover_link_runtime::motor::TurnStyle;

#[derive(Parser, Debug)]
#[command(version, about = "Drive a two-motor rover from HC-05 direction frames")]
struct Cli {
    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the control loop (default)
    Run(RunArgs),
    /// Listen at each common baud rate to find the module's setting
    ProbeBaud {
        #[arg(long, default_value = DEFAULT_PORT)]
        port: String,
        #[arg(long, default_value_t = PROBE_WINDOW.as_secs())]
        window_secs: u64,
    },
    /// Send one AT command and print the reply
    At {
        #[arg(long, default_value = DEFAULT_PORT)]
        port: String,
        #[arg(long, default_value_t = DEFAULT_BAUD)]
        baud: u32,
        #[arg(long, default_value_t = AT_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
        /// e.g. AT, AT+VERSION?, AT+UART?
        command: String,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,
    /// Duty held after the anti-stall burst (0..=65535)
    #[arg(long, default_value_t = DEFAULT_CRUISE_DUTY)]
    cruise_duty: u16,
    #[arg(long, default_value_t = BURST_DURATION.as_millis() as u64)]
    burst_ms: u64,
    #[arg(long, value_enum, default_value_t = TurnStyle::default())]
    turn_style: TurnStyle,
    /// Keep duty writes in-process instead of publishing them
    #[arg(long)]
    dry_run: bool,
    /// Don't publish motion state and link health
    #[arg(long)]
    no_telemetry: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self::from(RuntimeConfig::default())
    }
}

impl From<RuntimeConfig> for RunArgs {
    fn from(config: RuntimeConfig) -> Self {
        Self {
            port: config.port,
            baud: config.baud,
            cruise_duty: config.cruise_duty,
            burst_ms: config.burst.as_millis() as u64,
            turn_style: config.turn_style,
            dry_run: config.dry_run,
            no_telemetry: !config.telemetry,
        }
    }
}

impl From<RunArgs> for RuntimeConfig {
    fn from(args: RunArgs) -> Self {
        Self {
            port: args.port,
            baud: args.baud,
            cruise_duty: args.cruise_duty,
            burst: Duration::from_millis(args.burst_ms),
            turn_style: args.turn_style,
            dry_run: args.dry_run,
            telemetry: !args.no_telemetry,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or_else(|| Mode::Run(RunArgs::default())) {
        Mode::Run(args) => rover_link_runtime::runtime::run(args.into()).await,
        Mode::ProbeBaud { port, window_secs } => probe_baud(&port, window_secs),
        Mode::At {
            port,
            baud,
            timeout_ms,
            command,
        } => link::send_at(&port, baud, &command, Duration::from_millis(timeout_ms))
            .map(|resp| println!("{}", resp.text.trim_end()))
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

fn probe_baud(port: &str, window_secs: u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("Send some text from the paired device while each rate is tested...");
    let results = link::probe_baud(port, &BAUD_CANDIDATES, Duration::from_secs(window_secs))?;

    let hits: Vec<u32> = results.iter().filter(|p| p.responded()).map(|p| p.baud).collect();
    if hits.is_empty() {
        println!("No data at any rate. Check pairing, wiring and the module's UART setting.");
    } else {
        println!("Data received at: {:?}", hits);
    }
    Ok(())
}
