use std::{process, sync::Arc};

use agora::{
    application::{error::AppError, pagination::PageWindow, services::Services},
    cache::{CacheConfig, CoherentCache},
    config::{self, Command, FeedArgs, Settings},
    infra::{db::PostgresRepositories, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command.unwrap_or_default() {
        Command::Migrate(_) => run_migrate(&settings).await,
        Command::Feed(args) => run_feed(&settings, args).await,
        Command::Check(_) => run_check(&settings).await,
    }
}

async fn run_migrate(settings: &Settings) -> Result<(), AppError> {
    let pool = PostgresRepositories::connect(&settings.database).await?;
    PostgresRepositories::run_migrations(&pool).await?;
    info!("migrations applied");
    Ok(())
}

async fn run_check(settings: &Settings) -> Result<(), AppError> {
    let pool = PostgresRepositories::connect(&settings.database).await?;
    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::unexpected(format!("database health check failed: {err}")))?;
    info!("database reachable");
    Ok(())
}

async fn run_feed(settings: &Settings, args: FeedArgs) -> Result<(), AppError> {
    let cache = CoherentCache::in_memory(CacheConfig::from(&settings.cache));
    let pool = PostgresRepositories::connect(&settings.database).await?;
    let services = Services::new(Arc::new(PostgresRepositories::new(pool)), cache);

    let window = PageWindow::new(args.limit, args.offset);
    let page = services.feed.feed(args.viewer, window).await?;
    info!(
        viewer = %args.viewer,
        items = page.items.len(),
        total = page.total,
        "feed assembled"
    );

    let rendered = serde_json::to_string_pretty(&page)
        .map_err(|err| AppError::unexpected(format!("failed to encode feed: {err}")))?;
    println!("{rendered}");

    services.cache.close().await;
    Ok(())
}
