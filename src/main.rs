use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eras_telemetry::config::{RuntimeConfig, ServerConfig, StorageBackend, WriteMode};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// Device telemetry ingestion with change filtering
#[derive(Parser)]
#[command(name = "eras-telemetry")]
#[command(version)]
#[command(about = "Device telemetry ingestion with change filtering", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Storage backend: memory or dynamodb (overrides config file)
    #[arg(long, value_name = "BACKEND", global = true)]
    backend: Option<StorageBackend>,

    /// Write mode: best_effort or conditional (overrides config file)
    #[arg(long, value_name = "MODE", global = true)]
    write_mode: Option<WriteMode>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP ingestion server and operator view
    Serve {
        /// HTTP listen port (overrides config file)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Ingest a single payload and print the outcome
    Ingest {
        /// File holding the JSON payload; reads stdin when omitted
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Print every stored record as JSON
    Records {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = eras_telemetry::load_config(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    match cli.command {
        Command::Serve { port } => {
            let server = config.server.get_or_insert_with(ServerConfig::default);
            if let Some(port) = port {
                server.listen_addr = format!("0.0.0.0:{}", port);
            }
            eras_telemetry_server::run_with_config(config).await
        }
        Command::Ingest { input } => {
            eras_telemetry_server::init_tracing(&config);
            let body = read_input(input.as_deref()).await?;
            let outcome = eras_telemetry::ingest_once(&config, &body).await?;

            println!(
                "{}",
                serde_json::json!({
                    "statusCode": outcome.status_code(),
                    "body": outcome.message(),
                })
            );
            if outcome.error().is_some() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Records { pretty } => {
            eras_telemetry_server::init_tracing(&config);
            let store = eras_telemetry::store::initialize_store(&config.storage)
                .await
                .context("Failed to initialize telemetry store")?;
            let records = eras_telemetry::read_records(store.as_ref()).await?;

            let output = if pretty {
                serde_json::to_string_pretty(&records)?
            } else {
                serde_json::to_string(&records)?
            };
            println!("{}", output);
            Ok(())
        }
    }
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    use eras_telemetry::config::DynamoDbConfig;

    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
        if backend == StorageBackend::DynamoDb {
            config
                .storage
                .dynamodb
                .get_or_insert_with(DynamoDbConfig::default);
        }
    }

    if let Some(mode) = cli.write_mode {
        config.filter.write_mode = mode;
    }

    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
}

async fn read_input(path: Option<&std::path::Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read payload from {}", path.display())),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}
