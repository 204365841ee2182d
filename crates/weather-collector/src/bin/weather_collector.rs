use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use weather_collector::{Config, LapinConnector, OpenMeteoClient, QueuePublisher, WeatherCollector};

#[derive(FromArgs)]
/// Open-Meteo weather collector publishing to RabbitMQ
struct Args {
    /// path to a YAML configuration file (optional, environment variables override it)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// run a single collection cycle and exit
    #[argh(switch)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    // Variables already in the environment win over .env; a missing file is fine
    let dotenv_path = dotenvy::dotenv().ok();

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
            log::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(&config.log_level);
    env_logger::init_from_env(env);

    if let Some(path) = &dotenv_path {
        log::info!("Loaded environment from {}", path.display());
    }

    log::info!(
        "Using location: {} ({:.4}, {:.4})",
        config.city,
        config.latitude,
        config.longitude
    );

    let source = OpenMeteoClient::new(&config.api_url, &config.api_key, config.api_timeout())
        .context("failed to build weather API client")?;
    let publisher = QueuePublisher::new(
        LapinConnector,
        config.rabbitmq_url.clone(),
        config.rabbitmq_queue.clone(),
    );
    let mut collector = WeatherCollector::new(
        source,
        publisher,
        config.location(),
        config.collection_interval(),
    );

    if args.once {
        let ok = collector.run_once().await;
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    let shutdown_tx = tokio::sync::watch::Sender::new(());

    {
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal, stopping gracefully...");
            let _ = shutdown_tx.send(());
        })
        .context("failed to install signal handler")?;
    }

    collector.run(shutdown_tx.subscribe()).await;

    log::info!("Weather collector shut down, exiting");
    Ok(())
}
