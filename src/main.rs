//! Application entry point for steam-sale-bot.
//!
//! Initializes all components and starts the Discord bot.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dotenv::dotenv;
use log::debug;
use log::info;
use steam_sale_bot::bot::Bot;
use steam_sale_bot::clock::Clock;
use steam_sale_bot::clock::DailyTrigger;
use steam_sale_bot::clock::SystemClock;
use steam_sale_bot::config::Config;
use steam_sale_bot::logging::setup_logging;
use steam_sale_bot::notifier::discord_channel_notifier::DiscordChannelNotifier;
use steam_sale_bot::repository::Repository;
use steam_sale_bot::service::sale_check_service::SaleCheckService;
use steam_sale_bot::source::steam_store::SteamStoreSource;
use steam_sale_bot::task::daily_check::DailyCheckScheduler;
use steam_sale_bot::task::status_reporter::StatusReporter;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = load_config()?;
    let repository = setup_database(&config, init_start).await?;

    let mut bot = Bot::new(&config, repository.clone())?;
    bot.start()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = setup_tasks(&config, &bot, repository, shutdown_rx, init_start)?;

    run(init_start).await?;

    shutdown_tx.send_replace(true);
    for task in tasks {
        task.await?;
    }
    info!("Shutdown complete.");
    Ok(())
}

fn load_config() -> Result<Arc<Config>> {
    debug!("Loading configuration...");
    let mut config = Config::new();
    config.load()?;
    let config = Arc::new(config);
    setup_logging(&config)?;
    info!("Starting steam-sale-bot...");
    Ok(config)
}

async fn setup_database(config: &Config, init_start: Instant) -> Result<Arc<Repository>> {
    debug!("Setting up Repository...");
    let repository = Arc::new(Repository::new(&config.db_url, &config.db_path).await?);

    info!("Running database migrations...");
    repository.run_migrations().await?;
    info!(
        "Database setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(repository)
}

fn setup_tasks(
    config: &Config,
    bot: &Bot,
    repository: Arc<Repository>,
    shutdown: watch::Receiver<bool>,
    init_start: Instant,
) -> Result<Vec<JoinHandle<()>>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(DiscordChannelNotifier::new(bot.http.clone()));
    let service = Arc::new(SaleCheckService::new(repository.clone(), notifier));
    let source = Arc::new(SteamStoreSource::new(config)?);

    let scheduler = DailyCheckScheduler::new(
        repository,
        source,
        service,
        clock.clone(),
        Arc::new(DailyTrigger::new(config.check_time, config.check_timezone)),
        config.rate_limit_cooldown,
    );

    let mut tasks = Vec::new();
    if config.features.status_report {
        let reporter =
            StatusReporter::new(bot.presence.clone(), clock, scheduler.next_trigger_receiver());
        tasks.push(reporter.start(shutdown.clone()));
    }
    if config.features.daily_check {
        tasks.push(scheduler.start(shutdown));
    }

    info!(
        "Tasks setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(tasks)
}

async fn run(init_start: Instant) -> Result<()> {
    info!(
        "steam-sale-bot is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    Ok(())
}
