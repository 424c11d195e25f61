use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, LeagueConfig};
use crate::domain::ProviderKind;
use crate::error::Result;

use super::{EspnSource, LeagueSource, SleeperSource};

/// Create the provider source for one configured league.
pub async fn build_league_source(
    app_config: &AppConfig,
    league: &LeagueConfig,
) -> Result<Arc<dyn LeagueSource>> {
    let source: Arc<dyn LeagueSource> = match league.provider {
        ProviderKind::Espn => Arc::new(EspnSource::new(&app_config.espn, &league.id)?),
        ProviderKind::Sleeper => {
            Arc::new(SleeperSource::connect(&app_config.sleeper, &league.id).await?)
        }
    };

    info!(
        "Configured {} ({})",
        source.key(),
        league.name.as_deref().unwrap_or("unnamed")
    );
    Ok(source)
}

/// Create sources for every configured league.
///
/// A league whose source cannot be built is skipped so the others still run.
pub async fn build_league_sources(app_config: &AppConfig) -> Vec<Arc<dyn LeagueSource>> {
    let mut sources = Vec::with_capacity(app_config.leagues.len());
    for league in &app_config.leagues {
        match build_league_source(app_config, league).await {
            Ok(source) => sources.push(source),
            Err(e) => warn!(
                "Skipping {} league {}: {}",
                league.provider, league.id, e
            ),
        }
    }
    sources
}
