use clap::{Parser, Subcommand};

use crate::domain::{ActivityEvent, LeagueYearKey, MatchupSeries};
use crate::error::{Result, SyncError};
use crate::source::LeagueSource;
use crate::store::WatermarkStore;
use crate::sync::BatchReport;

#[derive(Parser)]
#[command(name = "leaguesync")]
#[command(version = "0.1.0")]
#[command(about = "Incremental fantasy league activity and score sync", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Use an in-memory store instead of PostgreSQL
    #[arg(long)]
    pub dry_run: bool,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync new activity for configured leagues
    Activity {
        /// Only this league (e.g., espn-123456)
        #[arg(short, long)]
        league: Option<String>,
    },
    /// Capture a score snapshot and print the period's series
    Scores {
        /// Only this league (e.g., sleeper-98765)
        #[arg(short, long)]
        league: Option<String>,
    },
    /// Print stored projection series for a scoring period
    Series {
        /// League-year (e.g., espn-123456/2022)
        #[arg(short, long)]
        league: String,
        /// Scoring period
        #[arg(short, long)]
        period: u32,
    },
    /// Print the most recent stored activity
    Recent {
        /// League-year (e.g., espn-123456/2022)
        #[arg(short, long)]
        league: String,
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Apply database migrations
    Migrate,
}

impl Cli {
    /// Reject flag combinations that cannot do anything useful
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            // An in-memory store starts empty, so there is nothing stored to read
            Commands::Series { .. } | Commands::Recent { .. } if self.dry_run => {
                Err(SyncError::Validation(
                    "--dry-run only applies to activity and scores runs".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// `provider-id` selector as accepted by `--league`
pub fn matches_league(key: &LeagueYearKey, selector: Option<&str>) -> bool {
    match selector {
        None => true,
        Some(s) => format!("{}-{}", key.provider, key.league_id) == s.trim(),
    }
}

pub fn print_batch(report: &BatchReport) {
    for outcome in &report.outcomes {
        println!(
            "  ✓ {:<40} {} rows ({})",
            outcome.key.to_string(),
            outcome.rows_written,
            outcome.kind
        );
    }
    for (key, err) in &report.failures {
        println!("  ✗ {:<40} {}", key.to_string(), err);
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}

pub fn print_series(key: &LeagueYearKey, period: u32, series: &[MatchupSeries]) {
    println!("{} period {}", key, period);
    if series.is_empty() {
        println!("  (no snapshots)");
        return;
    }

    for s in series {
        let (a, b) = s.latest();
        println!(
            "  matchup {:>4}: team {:>3} {:>7.2} vs team {:>3} {:>7.2}  ({} samples)",
            s.matchup_id,
            s.participant_a,
            a.map(|p| p.value).unwrap_or_default(),
            s.participant_b,
            b.map(|p| p.value).unwrap_or_default(),
            s.points_a.len().max(s.points_b.len())
        );
    }
}

async fn describe_event(event: &ActivityEvent, source: Option<&dyn LeagueSource>) -> Vec<String> {
    let mut lines = Vec::with_capacity(event.actions.len());
    for action in &event.actions {
        let (team, player) = match source {
            Some(source) => (
                source
                    .resolve_team_name(action.team_id)
                    .await
                    .unwrap_or_else(|_| format!("team {}", action.team_id)),
                source
                    .resolve_participant_name(action.participant_id)
                    .await
                    .unwrap_or_else(|_| format!("player {}", action.participant_id)),
            ),
            None => (
                format!("team {}", action.team_id),
                format!("player {}", action.participant_id),
            ),
        };
        lines.push(format!("{} {} {}", team, action.action_kind, player));
    }
    lines
}

/// Print recent activity, resolving names through `source` when available
pub async fn show_recent_activity(
    store: &dyn WatermarkStore,
    key: &LeagueYearKey,
    source: Option<&dyn LeagueSource>,
    limit: usize,
) -> Result<()> {
    let events = store.recent_activity(key, limit).await?;
    println!("{} latest activity", key);
    if events.is_empty() {
        println!("  (none)");
        return Ok(());
    }

    for event in &events {
        let when = crate::domain::millis_to_datetime(event.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| event.timestamp.to_string());
        for line in describe_event(event, source).await {
            println!("  {}  {}", when, line);
        }
    }
    Ok(())
}
