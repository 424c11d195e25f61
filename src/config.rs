use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::ProviderKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub espn: EspnConfig,
    #[serde(default)]
    pub sleeper: SleeperConfig,
    #[serde(default)]
    pub leagues: Vec<LeagueConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Activity events requested per feed page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Deadline for a single league-year run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

fn default_page_size() -> u32 {
    25
}

fn default_run_timeout() -> u64 {
    120
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspnConfig {
    #[serde(default = "default_espn_base_url")]
    pub base_url: String,
    /// Season to sync for every ESPN league
    #[serde(default = "default_espn_season")]
    pub season: u32,
    /// SWID cookie (private leagues)
    #[serde(default)]
    pub swid: Option<String>,
    /// espn_s2 cookie (private leagues)
    #[serde(default)]
    pub s2: Option<String>,
}

fn default_espn_base_url() -> String {
    "https://fantasy.espn.com/apis/v3/games/ffl".to_string()
}

fn default_espn_season() -> u32 {
    2022
}

impl Default for EspnConfig {
    fn default() -> Self {
        Self {
            base_url: default_espn_base_url(),
            season: default_espn_season(),
            swid: None,
            s2: None,
        }
    }
}

impl EspnConfig {
    /// Both cookies are needed for private league access
    pub fn is_private(&self) -> bool {
        matches!((&self.swid, &self.s2), (Some(swid), Some(s2)) if !swid.is_empty() && !s2.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleeperConfig {
    #[serde(default = "default_sleeper_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_sleeper_base_url() -> String {
    "https://api.sleeper.app/v1".to_string()
}

impl Default for SleeperConfig {
    fn default() -> Self {
        Self {
            base_url: default_sleeper_base_url(),
            token: None,
        }
    }
}

/// One configured provider league
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub provider: ProviderKind,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("sync.page_size", 25)?
            .set_default("sync.run_timeout_secs", 120)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LEAGUESYNC_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // LEAGUESYNC_DATABASE__URL, LEAGUESYNC_ESPN__SEASON, ...
            .add_source(
                Environment::with_prefix("LEAGUESYNC")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration for a single league without any config files
    pub fn for_league(provider: ProviderKind, league_id: &str, database_url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: default_max_connections(),
            },
            sync: SyncConfig::default(),
            espn: EspnConfig::default(),
            sleeper: SleeperConfig::default(),
            leagues: vec![LeagueConfig {
                provider,
                id: league_id.to_string(),
                name: None,
            }],
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.sync.page_size == 0 {
            errors.push("sync.page_size must be positive".to_string());
        }

        if self.sync.run_timeout_secs == 0 {
            errors.push("sync.run_timeout_secs must be positive".to_string());
        }

        if self.espn.swid.is_some() != self.espn.s2.is_some() {
            errors.push("espn.swid and espn.s2 must be set together".to_string());
        }

        let mut seen = HashSet::new();
        for league in &self.leagues {
            if league.id.trim().is_empty() {
                errors.push(format!("{} league with empty id", league.provider));
                continue;
            }
            if !seen.insert((league.provider, league.id.clone())) {
                errors.push(format!(
                    "duplicate league {}-{}",
                    league.provider, league.id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::for_league(ProviderKind::Espn, "123", "postgres://localhost/x");
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.espn.season, 2022);
        assert!(!config.espn.is_private());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = AppConfig::for_league(ProviderKind::Espn, "123", "postgres://x");
        config.sync.page_size = 0;
        config.espn.swid = Some("{abc}".to_string());
        config.leagues.push(LeagueConfig {
            provider: ProviderKind::Espn,
            id: "123".to_string(),
            name: None,
        });
        config.leagues.push(LeagueConfig {
            provider: ProviderKind::Sleeper,
            id: " ".to_string(),
            name: None,
        });

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("duplicate league espn-123")));
    }

    #[test]
    fn test_private_league_requires_both_cookies() {
        let espn = EspnConfig {
            swid: Some("{swid}".to_string()),
            s2: Some("s2".to_string()),
            ..Default::default()
        };
        assert!(espn.is_private());
    }
}
