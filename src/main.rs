//! trainping Binary Entry Point
//!
//! Parses ping-style flags, resolves the target and runs one campaign.
//! Core functionality is provided by the `trainping` library crate.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainping::{
    CampaignConfig, CampaignController, IcmpConfig, IcmpEngine, SignalGuard, Transport,
    parse_size_pattern, resolve_host,
};

/// Latency campaigns over trains of ICMP echo probes
#[derive(Parser, Debug)]
#[command(name = "trainping", version, about, long_about = None)]
struct Cli {
    /// Use non-privileged datagram-oriented ICMP sockets
    #[arg(short = 'u')]
    udp: bool,

    /// Debug statements
    #[arg(short = 'd')]
    debug: bool,

    /// Number of probes (cycles or trains) to send [default: 10]
    #[arg(short = 'c')]
    count: Option<u64>,

    /// Average interval between trains, in milliseconds [default: 1000]
    #[arg(short = 'i', value_name = "MS")]
    interval: Option<u64>,

    /// Number of pings in a single train [default: 1]
    #[arg(short = 't')]
    train_size: Option<u32>,

    /// Interval between pings in a train, in milliseconds [default: 100]
    #[arg(short = 'I', value_name = "MS")]
    train_interval: Option<u64>,

    /// Gamma for the uniform jitter distribution, in milliseconds [default: 0]
    #[arg(short = 'g', value_name = "MS")]
    gamma: Option<u64>,

    /// Rate parameter: average number of trains per minute [default: off]
    #[arg(short = 'r')]
    rate: Option<f64>,

    /// Source address
    #[arg(short = 's')]
    source: Option<IpAddr>,

    /// Pattern of payload sizes in comma separated format (no spaces)
    #[arg(short = 'p')]
    pattern: Option<String>,

    /// Path to a YAML campaign file (flags override its values)
    #[arg(long, env = "TRAINPING_CONFIG")]
    config: Option<PathBuf>,

    /// Sequence export file written by train captures
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Target hostname or IP address
    hostname: Option<String>,

    /// Source address (alternative to -s)
    #[arg(value_name = "SOURCE")]
    source_addr: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration file, then apply CLI overrides (CLI > file > defaults)
    let mut config = match &cli.config {
        Some(path) => match CampaignConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => CampaignConfig::default(),
    };

    if let Err(e) = apply_overrides(&mut config, &cli) {
        eprintln!("{e}");
        usage();
        return ExitCode::FAILURE;
    }

    init_tracing(config.debug);
    if let Some(path) = &cli.config {
        tracing::info!("Loaded configuration from: {}", path.display());
    }

    if config.host.is_empty() {
        usage();
        return ExitCode::FAILURE;
    }

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let target = match resolve_host(&config.host).await {
        Ok(ip) => ip,
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        host = %config.host,
        addr = %target,
        count = config.count,
        train_size = config.train_size,
        "Starting campaign"
    );

    let signals = match SignalGuard::install() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = IcmpEngine::new(IcmpConfig::from_campaign(&config, target));
    let mut controller = CampaignController::new(&config, target, engine, std::io::stdout());

    match controller.run(signals).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Campaign aborted");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr; stdout carries the ping report.
fn init_tracing(debug: bool) {
    let default_filter = if debug { "warn,trainping=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Apply command-line flags on top of `config`.
fn apply_overrides(config: &mut CampaignConfig, cli: &Cli) -> Result<(), trainping::ConfigError> {
    if let Some(host) = &cli.hostname {
        config.host = host.clone();
    }
    if let Some(source) = cli.source.or(cli.source_addr) {
        config.source = Some(source);
    }
    if cli.udp {
        config.transport = Transport::Datagram;
    }
    config.debug |= cli.debug;
    if let Some(count) = cli.count {
        config.count = count;
    }
    if let Some(ms) = cli.interval {
        config.interval = Duration::from_millis(ms);
    }
    if let Some(size) = cli.train_size {
        config.train_size = size;
    }
    if let Some(ms) = cli.train_interval {
        config.train_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.gamma {
        config.jitter = Duration::from_millis(ms);
    }
    if let Some(rate) = cli.rate {
        config.rate = rate;
    }
    if let Some(path) = &cli.export {
        config.export_path = path.clone();
    }
    if let Some(pattern) = &cli.pattern {
        config.pattern = parse_size_pattern(pattern)?;
    }
    Ok(())
}

/// Print usage to stderr.
fn usage() {
    eprintln!("{}", Cli::command().render_help());
}
