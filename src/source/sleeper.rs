//! Sleeper league source.
//!
//! Sleeper has no global activity feed: transactions are listed per week,
//! and a week's list is not ordered against its neighbours. A scan that starts
//! at offset 0 loads every week of the season once into a single newest-first
//! feed; later pages of the same scan are sliced from that feed.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use super::http::{build_http_client, send_json};
use super::LeagueSource;
use crate::config::SleeperConfig;
use crate::domain::{
    ActivityAction, ActivityEvent, LeagueYearKey, ProviderKind, ScoreboardMatchup,
    ACTION_DROPPED, ACTION_FA_ADDED, ACTION_TRADED, ACTION_WAIVER_ADDED,
};
use crate::error::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct NflState {
    week: u32,
    season: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    transaction_id: String,
    #[serde(rename = "type")]
    kind: String,
    status: String,
    status_updated: i64,
    #[serde(default)]
    adds: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    drops: Option<BTreeMap<String, i64>>,
}

impl Transaction {
    fn is_complete(&self) -> bool {
        self.status == "complete"
    }

    fn add_kind(&self) -> &'static str {
        match self.kind.as_str() {
            "waiver" => ACTION_WAIVER_ADDED,
            "trade" => ACTION_TRADED,
            _ => ACTION_FA_ADDED,
        }
    }

    fn into_event(self) -> ActivityEvent {
        let add_kind = self.add_kind();
        let adds = self.adds.iter().flatten().map(|(p, r)| (add_kind, p, *r));
        let drops = self.drops.iter().flatten().map(|(p, r)| (ACTION_DROPPED, p, *r));

        let actions = adds
            .chain(drops)
            .filter_map(|(kind, player, roster)| match player.parse::<i64>() {
                Ok(participant_id) => Some(ActivityAction {
                    action_kind: kind.to_string(),
                    participant_id,
                    team_id: roster,
                }),
                Err(_) => {
                    // Team defenses use abbreviations ("DEN") instead of numeric ids
                    debug!("Skipping non-numeric Sleeper player id {}", player);
                    None
                }
            })
            .collect();

        ActivityEvent::new(self.transaction_id, self.status_updated, actions)
    }
}

#[derive(Debug, Deserialize)]
struct MatchupEntry {
    roster_id: i64,
    #[serde(default)]
    matchup_id: Option<i64>,
    #[serde(default)]
    points: Option<f64>,
    #[serde(default)]
    custom_points: Option<f64>,
}

impl MatchupEntry {
    fn score(&self) -> f64 {
        self.custom_points.or(self.points).unwrap_or(0.0)
    }
}

/// Flatten weekly transaction lists into one newest-first feed of completed
/// events. Ties on timestamp are broken by id so pages stay stable.
fn merge_weeks(weeks: Vec<Vec<Transaction>>) -> Vec<ActivityEvent> {
    let mut events: Vec<ActivityEvent> = weeks
        .into_iter()
        .flatten()
        .filter(Transaction::is_complete)
        .map(Transaction::into_event)
        .collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    events
}

fn slice_page(feed: &[ActivityEvent], page_size: u32, offset: u32) -> Vec<ActivityEvent> {
    feed.iter()
        .skip(offset as usize)
        .take(page_size as usize)
        .cloned()
        .collect()
}

/// Pair roster entries sharing a matchup id
fn pair_matchups(entries: Vec<MatchupEntry>) -> Result<Vec<ScoreboardMatchup>> {
    let mut grouped: BTreeMap<i64, Vec<MatchupEntry>> = BTreeMap::new();
    for entry in entries {
        // Rosters on bye have no matchup id
        if let Some(matchup_id) = entry.matchup_id {
            grouped.entry(matchup_id).or_default().push(entry);
        }
    }

    grouped
        .into_iter()
        .map(|(matchup_id, mut sides)| {
            if sides.len() != 2 {
                return Err(SyncError::InvalidSourceData(format!(
                    "Sleeper matchup {} has {} rosters",
                    matchup_id,
                    sides.len()
                )));
            }
            sides.sort_by_key(|s| s.roster_id);
            Ok(ScoreboardMatchup {
                matchup_id,
                team_a: sides[0].roster_id,
                score_a: sides[0].score(),
                team_b: sides[1].roster_id,
                score_b: sides[1].score(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct User {
    user_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl User {
    fn team_name(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("team_name"))
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.display_name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Roster {
    roster_id: i64,
    #[serde(default)]
    owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Player {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl Player {
    fn name(&self) -> Option<String> {
        self.full_name.clone().or_else(|| match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            _ => None,
        })
    }
}

pub struct SleeperSource {
    http: Client,
    base_url: String,
    token: Option<String>,
    key: LeagueYearKey,
    teams: OnceCell<HashMap<i64, String>>,
    players: OnceCell<HashMap<i64, String>>,
    feed: Mutex<Option<Vec<ActivityEvent>>>,
}

impl SleeperSource {
    /// Build a source for the league's current NFL season
    pub async fn connect(config: &SleeperConfig, league_id: &str) -> Result<Self> {
        let http = build_http_client("leaguesync-sleeper/0.1")?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let mut source = Self {
            http,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            key: LeagueYearKey::new(ProviderKind::Sleeper, league_id, ""),
            teams: OnceCell::new(),
            players: OnceCell::new(),
            feed: Mutex::new(None),
        };
        let state = source.nfl_state().await?;
        source.key.season = state.season;
        Ok(source)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.header(AUTHORIZATION, token.as_str()),
            None => req,
        }
    }

    async fn nfl_state(&self) -> Result<NflState> {
        send_json(self.get("/state/nfl"), "Sleeper NFL state").await
    }

    async fn transactions(&self, week: u32) -> Result<Vec<Transaction>> {
        let path = format!("/league/{}/transactions/{}", self.key.league_id, week);
        send_json(self.get(&path), "Sleeper transactions").await
    }

    async fn users(&self) -> Result<Vec<User>> {
        let path = format!("/league/{}/users", self.key.league_id);
        send_json(self.get(&path), "Sleeper users").await
    }

    async fn rosters(&self) -> Result<Vec<Roster>> {
        let path = format!("/league/{}/rosters", self.key.league_id);
        send_json(self.get(&path), "Sleeper rosters").await
    }

    async fn team_names(&self) -> Result<&HashMap<i64, String>> {
        self.teams
            .get_or_try_init(|| async {
                let users: HashMap<String, String> = self
                    .users()
                    .await?
                    .into_iter()
                    .filter_map(|u| u.team_name().map(|name| (u.user_id, name)))
                    .collect();
                let rosters = self.rosters().await?;
                Ok::<_, SyncError>(
                    rosters
                        .into_iter()
                        .filter_map(|r| {
                            let name = users.get(r.owner_id.as_deref()?)?;
                            Some((r.roster_id, name.clone()))
                        })
                        .collect(),
                )
            })
            .await
    }

    async fn player_names(&self) -> Result<&HashMap<i64, String>> {
        self.players
            .get_or_try_init(|| async {
                let players: HashMap<String, Player> =
                    send_json(self.get("/players/nfl"), "Sleeper players").await?;
                debug!("Loaded {} Sleeper players", players.len());
                Ok::<_, SyncError>(
                    players
                        .into_iter()
                        .filter_map(|(id, p)| Some((id.parse::<i64>().ok()?, p.name()?)))
                        .collect(),
                )
            })
            .await
    }
}

#[async_trait]
impl LeagueSource for SleeperSource {
    fn key(&self) -> &LeagueYearKey {
        &self.key
    }

    async fn fetch_activity_page(&self, page_size: u32, offset: u32) -> Result<Vec<ActivityEvent>> {
        let mut feed = self.feed.lock().await;
        // Offset 0 starts a new scan
        if offset == 0 || feed.is_none() {
            let current_week = self.nfl_state().await?.week.max(1);
            let mut weeks = Vec::with_capacity(current_week as usize);
            for week in 1..=current_week {
                weeks.push(self.transactions(week).await?);
            }
            let merged = merge_weeks(weeks);
            debug!(
                "Loaded {} completed Sleeper transactions across {} weeks",
                merged.len(),
                current_week
            );
            *feed = Some(merged);
        }

        Ok(feed
            .as_deref()
            .map(|events| slice_page(events, page_size, offset))
            .unwrap_or_default())
    }

    async fn fetch_scoreboard(&self, period: u32) -> Result<Vec<ScoreboardMatchup>> {
        let path = format!("/league/{}/matchups/{}", self.key.league_id, period);
        let entries: Vec<MatchupEntry> = send_json(self.get(&path), "Sleeper matchups").await?;
        pair_matchups(entries)
    }

    async fn current_period(&self) -> Result<u32> {
        Ok(self.nfl_state().await?.week)
    }

    async fn fetch_roster_config(&self) -> Result<Value> {
        let users: Value = send_json(
            self.get(&format!("/league/{}/users", self.key.league_id)),
            "Sleeper users",
        )
        .await?;
        let rosters: Value = send_json(
            self.get(&format!("/league/{}/rosters", self.key.league_id)),
            "Sleeper rosters",
        )
        .await?;
        Ok(json!({ "users": users, "rosters": rosters }))
    }

    async fn resolve_participant_name(&self, participant_id: i64) -> Result<String> {
        Ok(self
            .player_names()
            .await?
            .get(&participant_id)
            .cloned()
            .unwrap_or_else(|| format!("Player {}", participant_id)))
    }

    async fn resolve_team_name(&self, team_id: i64) -> Result<String> {
        Ok(self
            .team_names()
            .await?
            .get(&team_id)
            .cloned()
            .unwrap_or_else(|| format!("Team {}", team_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiver_transaction_maps_adds_then_drops() {
        let tx: Transaction = serde_json::from_value(json!({
            "transaction_id": "8881",
            "type": "waiver",
            "status": "complete",
            "status_updated": 1_694_000_000_000i64,
            "adds": {"4034": 2},
            "drops": {"6794": 2, "DEN": 2}
        }))
        .unwrap();
        assert!(tx.is_complete());

        let event = tx.into_event();
        assert_eq!(event.id, "8881");
        assert_eq!(event.actions.len(), 2);
        assert_eq!(event.actions[0].action_kind, "WAIVER ADDED");
        assert_eq!(event.actions[0].participant_id, 4034);
        assert_eq!(event.actions[1].action_kind, "DROPPED");
        assert_eq!(event.actions[1].team_id, 2);
    }

    fn tx(id: &str, status_updated: i64) -> Transaction {
        serde_json::from_value(json!({
            "transaction_id": id,
            "type": "free_agent",
            "status": "complete",
            "status_updated": status_updated,
            "adds": {"100": 1}
        }))
        .unwrap()
    }

    #[test]
    fn test_merged_feed_pages_cover_every_week_once() {
        // A later week can hold an older transaction than an earlier week
        let week1 = vec![tx("C", 400), tx("D", 100)];
        let week2 = vec![tx("A", 300), tx("B", 200)];
        let feed = merge_weeks(vec![week1, week2]);

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = slice_page(&feed, 2, offset);
            if page.is_empty() {
                break;
            }
            offset += page.len() as u32;
            seen.extend(page.into_iter().map(|e| e.id));
        }

        assert_eq!(seen, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_merged_feed_skips_incomplete_and_breaks_ties_by_id() {
        let mut pending = tx("P", 900);
        pending.status = "failed".to_string();
        let feed = merge_weeks(vec![vec![tx("X", 500), pending], vec![tx("Y", 500)]]);

        let ids: Vec<_> = feed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["Y", "X"]);
        assert!(slice_page(&feed, 2, 2).is_empty());
    }

    #[test]
    fn test_pair_matchups_orders_by_roster_and_skips_byes() {
        let entries: Vec<MatchupEntry> = serde_json::from_value(json!([
            {"roster_id": 4, "matchup_id": 1, "points": 88.5},
            {"roster_id": 2, "matchup_id": 1, "points": 101.0, "custom_points": 99.0},
            {"roster_id": 7, "matchup_id": null, "points": 0.0}
        ]))
        .unwrap();

        let matchups = pair_matchups(entries).unwrap();
        assert_eq!(matchups.len(), 1);
        assert_eq!(matchups[0].team_a, 2);
        assert_eq!(matchups[0].score_a, 99.0);
        assert_eq!(matchups[0].team_b, 4);
    }

    #[test]
    fn test_pair_matchups_rejects_unpaired_roster() {
        let entries: Vec<MatchupEntry> = serde_json::from_value(json!([
            {"roster_id": 4, "matchup_id": 3, "points": 1.0}
        ]))
        .unwrap();

        let err = pair_matchups(entries).unwrap_err();
        assert!(matches!(err, SyncError::InvalidSourceData(_)));
    }

    #[test]
    fn test_user_team_name_prefers_metadata() {
        let user: User = serde_json::from_value(json!({
            "user_id": "1", "display_name": "craig", "metadata": {"team_name": "Bot Squad"}
        }))
        .unwrap();
        assert_eq!(user.team_name().as_deref(), Some("Bot Squad"));
    }
}
