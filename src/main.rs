use anyhow::Context;
use clap::Parser;
use plot_alert_sync::consumer::{create_alert_consumer, ConsumerConfig};
use plot_alert_sync::plot::InMemoryPlotStore;
use plot_alert_sync::{init_custom_tracing, init_tracing, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "plot-alert-sync")]
#[command(version, about = "Keeps plot statuses in sync with alert-created events", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Kafka/Redpanda brokers
    #[arg(long)]
    brokers: Option<String>,

    /// Consumer group ID
    #[arg(long)]
    group_id: Option<String>,

    /// Inbound queue carrying alert-created events
    #[arg(long)]
    queue: Option<String>,

    /// Dead-letter queue
    #[arg(long)]
    dead_letter_queue: Option<String>,

    /// Total processing attempts per message
    #[arg(long)]
    max_retry_attempts: Option<u32>,

    /// JSON file with the plots to serve
    #[arg(long, value_name = "FILE")]
    plots: Option<PathBuf>,

    /// Enable JSON structured logging
    #[arg(long)]
    json_logs: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn consumer_config(&self) -> anyhow::Result<ConsumerConfig> {
        let mut config = match &self.config {
            Some(path) => ConsumerConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ConsumerConfig::default(),
        };

        if let Some(brokers) = &self.brokers {
            config.brokers = brokers.clone();
        }
        if let Some(group_id) = &self.group_id {
            config.group_id = group_id.clone();
        }
        if let Some(queue) = &self.queue {
            config.queue_name = queue.clone();
        }
        if let Some(queue) = &self.dead_letter_queue {
            config.dead_letter_queue_name = queue.clone();
        }
        if let Some(attempts) = self.max_retry_attempts {
            config.retry_policy.max_attempts = attempts;
        }

        config.validate().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        init_tracing();
    } else {
        init_custom_tracing(&cli.log_level);
    }

    let config = cli.consumer_config()?;
    if !config.enabled {
        info!("Alert consumer disabled by configuration");
        return Ok(());
    }

    let store = match &cli.plots {
        Some(path) => InMemoryPlotStore::from_json_file(path)?,
        None => {
            warn!("No plots file given, starting with an empty plot store");
            InMemoryPlotStore::new()
        }
    };
    info!(version = VERSION, plots = store.len(), "Starting plot-alert-sync");

    let consumer = match create_alert_consumer(&config, Arc::new(store)).await {
        Ok(consumer) => consumer,
        Err(e) if e.is_connection_failure() => {
            error!(brokers = %config.brokers, "Broker connection failed: {}", e);
            std::process::exit(e.exit_code());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to start alert consumer")),
    };

    let result = consumer
        .spawn()
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received, shutting down");
        })
        .await;

    if let Err(e) = result {
        error!("Alert consumer stopped with error: {}", e);
        std::process::exit(e.exit_code());
    }
    Ok(())
}
