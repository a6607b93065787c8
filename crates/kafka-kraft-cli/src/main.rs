//! Kafka KRaft Container CLI
//!
//! Starts a single-node Kafka broker in KRaft mode inside a Docker container,
//! validates container configuration files and renders broker startup scripts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_kraft_core::config::{KafkaContainerConfig, LoggingConfig};
use kafka_kraft_core::container::prepare;
use kafka_kraft_core::listener::AdvertisedAddress;
use kafka_kraft_core::{
    DockerRuntime, KafkaContainer, KafkaListener, ReservedListeners, RunOptions, StartupScript,
};

/// Single-node Kafka KRaft broker containers.
#[derive(Parser)]
#[command(name = "kafka-kraft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a broker, print its bootstrap servers and wait for Ctrl-C.
    Run(Overrides),
    /// Validate the configuration without starting anything.
    Validate(Overrides),
    /// Print the startup script the broker would run.
    Render {
        #[command(flatten)]
        overrides: Overrides,

        /// Container hostname to advertise.
        #[arg(long, default_value = "kafka-kraft")]
        hostname: String,

        /// Host port mapped to the plaintext listener.
        #[arg(long, default_value_t = 9093)]
        mapped_port: u16,

        /// Host the plaintext listener is published on.
        #[arg(long, default_value = "localhost")]
        host: String,
    },
}

/// Command-line overrides of the configuration file.
#[derive(Args)]
struct Overrides {
    /// Override broker image.
    #[arg(long)]
    image: Option<String>,

    /// Override cluster id.
    #[arg(long)]
    cluster_id: Option<String>,

    /// Add a listener as NAME:HOST:PORT (repeatable).
    #[arg(long = "listener", value_parser = parse_listener)]
    listeners: Vec<KafkaListener>,

    /// Override network to attach to.
    #[arg(long)]
    network: Option<String>,

    /// Network alias (repeatable, requires --network).
    #[arg(long = "alias", requires = "network")]
    aliases: Vec<String>,

    /// Override startup timeout in seconds.
    #[arg(long)]
    startup_timeout_secs: Option<u64>,
}

impl Overrides {
    fn apply(self, mut options: RunOptions) -> RunOptions {
        if let Some(image) = self.image {
            options.image = image;
        }
        if let Some(cluster_id) = self.cluster_id {
            options.cluster_id = Some(cluster_id);
        }
        if !self.listeners.is_empty() {
            options.listeners = self.listeners;
        }
        if let Some(network) = self.network {
            options = options.with_network(network, self.aliases);
        }
        if let Some(secs) = self.startup_timeout_secs {
            options = options.with_startup_timeout(Duration::from_secs(secs));
        }
        options
    }
}

fn parse_listener(value: &str) -> Result<KafkaListener, String> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(host), Some(port)) => Ok(KafkaListener::new(name, host, port)),
        _ => Err(format!("expected NAME:HOST:PORT, got '{value}'")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => KafkaContainerConfig::from_file(path)
            .with_context(|| format!("failed to load {path}"))?,
        None => KafkaContainerConfig {
            container: RunOptions::default(),
            logging: LoggingConfig::default(),
        },
    };

    // Override log level from verbosity flag
    let log_config = match cli.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };

    // Setup tracing
    setup_tracing(&log_config);

    match cli.command {
        Command::Run(overrides) => {
            let options = overrides.apply(config.container);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_broker(options))
        }
        Command::Validate(overrides) => validate(&overrides.apply(config.container)),
        Command::Render {
            overrides,
            hostname,
            mapped_port,
            host,
        } => {
            let address = AdvertisedAddress {
                host,
                mapped_port,
                hostname,
            };
            render(&overrides.apply(config.container), &address)
        }
    }
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only command output.
    if config.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn validate(options: &RunOptions) -> anyhow::Result<()> {
    let prepared = prepare(options, &ReservedListeners::kraft_defaults())?;
    info!(
        image = %prepared.image,
        cluster_id = %prepared.identity.cluster_id(),
        "configuration is valid"
    );
    println!("listeners={}", prepared.plan.listeners_value());
    println!(
        "listener.security.protocol.map={}",
        prepared.plan.security_protocol_map()
    );
    println!(
        "inter.broker.listener.name={}",
        prepared.plan.inter_broker_listener()
    );
    Ok(())
}

fn render(options: &RunOptions, address: &AdvertisedAddress) -> anyhow::Result<()> {
    let prepared = prepare(options, &ReservedListeners::kraft_defaults())?;
    let script = StartupScript::render(
        &prepared.plan,
        &prepared.identity,
        address,
        &options.broker_properties,
    );
    print!("{}", script.content());
    Ok(())
}

async fn run_broker(options: RunOptions) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        image = %options.image,
        "starting kafka kraft container"
    );

    let runtime = Arc::new(DockerRuntime::connect()?);

    // Cancel startup on shutdown signals
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown.cancel();
    });

    let kafka = KafkaContainer::run_with_cancellation(runtime, options, cancel.clone()).await?;

    for broker in kafka.brokers().await? {
        println!("{broker}");
    }
    if let Ok(network_brokers) = kafka.network_brokers() {
        for broker in network_brokers {
            info!(broker = %broker, "reachable from network");
        }
    }
    info!(
        container_id = %kafka.id(),
        cluster_id = %kafka.cluster_id(),
        "broker ready, press Ctrl-C to stop"
    );

    cancel.cancelled().await;
    kafka.terminate().await?;

    info!("broker container removed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listener() {
        let listener = parse_listener("BROKER:kafka:9092").unwrap();
        assert_eq!(listener, KafkaListener::new("BROKER", "kafka", "9092"));
        assert!(parse_listener("BROKER:kafka").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "kafka-kraft",
            "validate",
            "--cluster-id",
            "kraftCluster",
            "--listener",
            "BROKER:kafka:9092",
            "--network",
            "kafka-net",
            "--alias",
            "kafka",
        ]);
        let Command::Validate(overrides) = cli.command else {
            panic!("expected validate");
        };
        let options = overrides.apply(RunOptions::default());
        assert_eq!(options.cluster_id.as_deref(), Some("kraftCluster"));
        assert_eq!(options.listeners.len(), 1);
        assert_eq!(options.aliases(), ["kafka".to_string()]);
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_validate_rejects_reserved_port() {
        let options = RunOptions::default()
            .with_listeners(vec![KafkaListener::new("BROKER", "kafka", "9094")]);
        assert!(validate(&options).is_err());
    }
}
