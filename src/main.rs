use clap::Parser;
use leaguesync::cli::{self, Cli, Commands};
use leaguesync::config::AppConfig;
use leaguesync::domain::LeagueYearKey;
use leaguesync::error::{Result, SyncError};
use leaguesync::source::{build_league_source, build_league_sources, LeagueSource};
use leaguesync::store::{MemoryStore, PostgresStore, WatermarkStore};
use leaguesync::sync::{self, RunKind, SyncRunner};
use std::sync::Arc;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;
    let config = AppConfig::load_from(&cli.config)?;

    match &cli.command {
        Commands::Migrate => {
            init_logging(&config.logging);
            let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
        }
        Commands::Activity { league } => {
            init_logging(&config.logging);
            run_activity_mode(&cli, &config, league.as_deref()).await?;
        }
        Commands::Scores { league } => {
            init_logging(&config.logging);
            run_scores_mode(&cli, &config, league.as_deref()).await?;
        }
        Commands::Series { league, period } => {
            init_logging_simple();
            let key = LeagueYearKey::parse_short(league)?;
            let store = open_store(&config, cli.dry_run).await?;
            let series = sync::aggregate(store.as_ref(), &key, *period, &[]).await?;
            cli::print_series(&key, *period, &series);
        }
        Commands::Recent { league, limit } => {
            init_logging_simple();
            let key = LeagueYearKey::parse_short(league)?;
            let store = open_store(&config, cli.dry_run).await?;
            let source = name_source(&config, &key).await;
            cli::show_recent_activity(store.as_ref(), &key, source.as_deref(), *limit).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn WatermarkStore>> {
    if dry_run {
        info!("Dry run: using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    Ok(Arc::new(store))
}

async fn build_runner(cli: &Cli, config: &AppConfig, selector: Option<&str>) -> Result<SyncRunner> {
    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("Config: {}", problem);
        }
        return Err(SyncError::Validation(problems.join("; ")));
    }

    let store = open_store(config, cli.dry_run).await?;
    let mut runner = SyncRunner::new(config.sync.clone(), store);
    for source in build_league_sources(config).await {
        if cli::matches_league(source.key(), selector) {
            runner.register(source);
        }
    }

    if runner.keys().is_empty() {
        warn!("No leagues to sync");
    }
    Ok(runner)
}

async fn run_activity_mode(cli: &Cli, config: &AppConfig, selector: Option<&str>) -> Result<()> {
    let runner = build_runner(cli, config, selector).await?;
    let report = runner.run_all(RunKind::Activity).await;
    cli::print_batch(&report);

    if report.failed() > 0 {
        return Err(anyhow::anyhow!("{} activity runs failed", report.failed()).into());
    }
    Ok(())
}

async fn run_scores_mode(cli: &Cli, config: &AppConfig, selector: Option<&str>) -> Result<()> {
    let runner = build_runner(cli, config, selector).await?;
    let mut failed = 0;

    for key in runner.keys() {
        let result = match runner.capture_snapshot(&key).await {
            Ok(report) => runner
                .aggregate(&key, report.period, &report.rows)
                .await
                .map(|series| (report.period, series)),
            Err(e) => Err(e),
        };

        match result {
            Ok((period, series)) => cli::print_series(&key, period, &series),
            Err(e) => {
                error!("Score snapshot for {} failed: {}", key, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{} score runs failed", failed).into());
    }
    Ok(())
}

/// Source used only to resolve display names; missing names fall back to ids
async fn name_source(config: &AppConfig, key: &LeagueYearKey) -> Option<Arc<dyn LeagueSource>> {
    let league = config
        .leagues
        .iter()
        .find(|l| l.provider == key.provider && l.id == key.league_id)?;

    match build_league_source(config, league).await {
        Ok(source) => Some(source),
        Err(e) => {
            warn!("Names unavailable for {}: {}", key, e);
            None
        }
    }
}
