//! ESPN fantasy football league source.
//!
//! Activity comes from the league `communication` endpoint, filtered to
//! transaction topics and sorted newest first through the `X-Fantasy-Filter`
//! header, which also carries limit/offset paging.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, COOKIE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use super::http::{build_http_client, send_json};
use super::LeagueSource;
use crate::config::EspnConfig;
use crate::domain::{
    ActivityAction, ActivityEvent, LeagueYearKey, ProviderKind, ScoreboardMatchup,
    ACTION_DROPPED, ACTION_FA_ADDED, ACTION_TRADED, ACTION_WAIVER_ADDED,
};
use crate::error::{Result, SyncError};

const FANTASY_FILTER_HEADER: &str = "x-fantasy-filter";

const MSG_FA_ADDED: i64 = 178;
const MSG_DROPPED: i64 = 179;
const MSG_WAIVER_ADDED: i64 = 180;
const MSG_DROPPED_WAIVER: i64 = 181;
const MSG_DROPPED_MOVE: i64 = 239;
const MSG_TRADED: i64 = 244;

const ACTIVITY_MESSAGE_TYPES: [i64; 6] = [
    MSG_FA_ADDED,
    MSG_WAIVER_ADDED,
    MSG_DROPPED,
    MSG_DROPPED_MOVE,
    MSG_DROPPED_WAIVER,
    MSG_TRADED,
];

fn action_kind(message_type: i64) -> &'static str {
    match message_type {
        MSG_FA_ADDED => ACTION_FA_ADDED,
        MSG_WAIVER_ADDED => ACTION_WAIVER_ADDED,
        MSG_DROPPED | MSG_DROPPED_WAIVER | MSG_DROPPED_MOVE => ACTION_DROPPED,
        MSG_TRADED => ACTION_TRADED,
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Deserialize)]
struct CommunicationResponse {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    id: String,
    date: i64,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    message_type_id: i64,
    #[serde(default)]
    target_id: Option<i64>,
    #[serde(default, rename = "for")]
    for_team: Option<i64>,
    #[serde(default)]
    to: Option<i64>,
    #[serde(default)]
    from: Option<i64>,
}

impl Message {
    /// Team the move is attributed to
    fn team_id(&self) -> Option<i64> {
        match self.message_type_id {
            MSG_TRADED => self.from,
            MSG_DROPPED_MOVE => self.for_team,
            _ => self.to,
        }
    }

    fn to_action(&self) -> Option<ActivityAction> {
        Some(ActivityAction {
            action_kind: action_kind(self.message_type_id).to_string(),
            participant_id: self.target_id?,
            team_id: self.team_id().unwrap_or_default(),
        })
    }
}

impl Topic {
    fn into_event(self) -> ActivityEvent {
        let actions = self.messages.iter().filter_map(Message::to_action).collect();
        ActivityEvent::new(self.id, self.date, actions)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Team {
    id: i64,
    #[serde(default)]
    abbrev: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    owners: Vec<String>,
}

impl Team {
    fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match (&self.location, &self.nickname) {
            (Some(location), Some(nickname)) => format!("{} {}", location.trim(), nickname.trim()),
            _ => format!("Team {}", self.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<Team>,
    #[serde(default)]
    members: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    scoring_period_id: Option<u32>,
    #[serde(default)]
    status: Option<LeagueStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeagueStatus {
    #[serde(default)]
    current_matchup_period: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleEntry {
    id: i64,
    matchup_period_id: u32,
    #[serde(default)]
    home: Option<ScheduleSide>,
    #[serde(default)]
    away: Option<ScheduleSide>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleSide {
    team_id: i64,
    #[serde(default)]
    total_points: Option<f64>,
    #[serde(default)]
    total_points_live: Option<f64>,
    #[serde(default)]
    total_projected_points_live: Option<f64>,
}

impl ScheduleSide {
    /// Live projection when ESPN has one, otherwise the live or final score
    fn projection(&self) -> f64 {
        self.total_projected_points_live
            .or(self.total_points_live)
            .or(self.total_points)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Player {
    id: i64,
    #[serde(default)]
    full_name: Option<String>,
}

/// Collapse the season schedule into the matchups of one period
fn matchups_for_period(schedule: Vec<ScheduleEntry>, period: u32) -> Vec<ScoreboardMatchup> {
    schedule
        .into_iter()
        .filter(|entry| entry.matchup_period_id == period)
        .filter_map(|entry| {
            // Byes have no away side
            let home = entry.home?;
            let away = entry.away?;
            Some(ScoreboardMatchup {
                matchup_id: entry.id,
                team_a: home.team_id,
                score_a: home.projection(),
                team_b: away.team_id,
                score_b: away.projection(),
            })
        })
        .collect()
}

pub struct EspnSource {
    http: Client,
    base_url: String,
    key: LeagueYearKey,
    cookie: Option<HeaderValue>,
    teams: OnceCell<HashMap<i64, String>>,
    players: OnceCell<HashMap<i64, String>>,
}

impl EspnSource {
    pub fn new(config: &EspnConfig, league_id: &str) -> Result<Self> {
        let cookie = if config.is_private() {
            let value = format!(
                "espn_s2={}; SWID={}",
                config.s2.as_deref().unwrap_or_default(),
                config.swid.as_deref().unwrap_or_default()
            );
            Some(HeaderValue::from_str(&value).map_err(|e| {
                SyncError::Validation(format!("invalid ESPN cookie value: {}", e))
            })?)
        } else {
            None
        };

        Ok(Self {
            http: build_http_client("leaguesync-espn/0.1")?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key: LeagueYearKey::new(ProviderKind::Espn, league_id, config.season.to_string()),
            cookie,
            teams: OnceCell::new(),
            players: OnceCell::new(),
        })
    }

    fn league_url(&self) -> String {
        format!(
            "{}/seasons/{}/segments/0/leagues/{}",
            self.base_url, self.key.season, self.key.league_id
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(url);
        match &self.cookie {
            Some(cookie) => req.header(COOKIE, cookie.clone()),
            None => req,
        }
    }

    async fn fetch_teams(&self) -> Result<TeamsResponse> {
        let req = self.get(&self.league_url()).query(&[("view", "mTeam")]);
        send_json(req, "ESPN teams").await
    }

    async fn team_names(&self) -> Result<&HashMap<i64, String>> {
        self.teams
            .get_or_try_init(|| async {
                let teams = self.fetch_teams().await?;
                Ok::<_, SyncError>(
                    teams
                        .teams
                        .iter()
                        .map(|t| (t.id, t.display_name()))
                        .collect(),
                )
            })
            .await
    }

    async fn player_names(&self) -> Result<&HashMap<i64, String>> {
        self.players
            .get_or_try_init(|| async {
                let url = format!("{}/seasons/{}/players", self.base_url, self.key.season);
                let req = self
                    .get(&url)
                    .query(&[("scoringPeriodId", "0"), ("view", "players_wl")])
                    .header(
                        FANTASY_FILTER_HEADER,
                        json!({"filterActive": {"value": true}}).to_string(),
                    );
                let players: Vec<Player> = send_json(req, "ESPN players").await?;
                debug!("Loaded {} ESPN players", players.len());
                Ok::<_, SyncError>(
                    players
                        .into_iter()
                        .filter_map(|p| p.full_name.map(|name| (p.id, name)))
                        .collect(),
                )
            })
            .await
    }
}

#[async_trait]
impl LeagueSource for EspnSource {
    fn key(&self) -> &LeagueYearKey {
        &self.key
    }

    async fn fetch_activity_page(&self, page_size: u32, offset: u32) -> Result<Vec<ActivityEvent>> {
        let filter = json!({
            "topics": {
                "filterType": {"value": ["ACTIVITY_TRANSACTIONS"]},
                "limit": page_size,
                "limitPerMessageSet": {"value": 25},
                "offset": offset,
                "sortMessageDate": {"sortPriority": 1, "sortAsc": false},
                "sortFor": {"sortPriority": 2, "sortAsc": false},
                "filterIncludeMessageTypeIds": {"value": ACTIVITY_MESSAGE_TYPES},
            }
        });
        let url = format!("{}/communication/", self.league_url());
        let req = self
            .get(&url)
            .query(&[("view", "kona_league_communication")])
            .header(FANTASY_FILTER_HEADER, filter.to_string());

        let resp: CommunicationResponse = send_json(req, "ESPN activity").await?;
        Ok(resp.topics.into_iter().map(Topic::into_event).collect())
    }

    async fn fetch_scoreboard(&self, period: u32) -> Result<Vec<ScoreboardMatchup>> {
        let period_param = period.to_string();
        let req = self.get(&self.league_url()).query(&[
            ("view", "mMatchupScore"),
            ("view", "mScoreboard"),
            ("scoringPeriodId", period_param.as_str()),
        ]);
        let resp: ScheduleResponse = send_json(req, "ESPN scoreboard").await?;
        Ok(matchups_for_period(resp.schedule, period))
    }

    async fn current_period(&self) -> Result<u32> {
        let req = self.get(&self.league_url()).query(&[("view", "mStatus")]);
        let resp: StatusResponse = send_json(req, "ESPN status").await?;
        resp.status
            .and_then(|s| s.current_matchup_period)
            .or(resp.scoring_period_id)
            .ok_or_else(|| {
                SyncError::InvalidSourceData(format!("{}: missing current matchup period", self.key))
            })
    }

    async fn fetch_roster_config(&self) -> Result<Value> {
        let resp = self.fetch_teams().await?;
        let teams: Vec<Value> = resp
            .teams
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "abbreviation": t.abbrev,
                    "name": t.display_name(),
                    "owners": t.owners,
                })
            })
            .collect();
        Ok(json!({ "members": resp.members, "teams": teams }))
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
    fn test_topic_maps_to_event() {
        let raw = json!({
            "topics": [{
                "id": "abc-123",
                "date": 1_662_000_000_000i64,
                "messages": [
                    {"messageTypeId": 178, "targetId": 4262921, "to": 3, "for": 3},
                    {"messageTypeId": 179, "targetId": 15847, "to": 3, "from": 3},
                    {"messageTypeId": 244, "targetId": 3116385, "from": 5, "to": 7},
                    {"messageTypeId": 178, "to": 3}
                ]
            }]
        });
        let resp: CommunicationResponse = serde_json::from_value(raw).unwrap();
        let event = resp.topics.into_iter().next().unwrap().into_event();

        assert_eq!(event.id, "abc-123");
        assert_eq!(event.timestamp, 1_662_000_000_000);
        assert_eq!(event.actions.len(), 3);
        assert_eq!(event.actions[0].action_kind, "FA ADDED");
        assert_eq!(event.actions[1].action_kind, "DROPPED");
        assert_eq!(event.actions[2].action_kind, "TRADED");
        assert_eq!(event.actions[2].team_id, 5);
    }

    #[test]
    fn test_matchups_for_period_skips_byes_and_other_weeks() {
        let raw = json!({
            "schedule": [
                {"id": 1, "matchupPeriodId": 3,
                 "home": {"teamId": 1, "totalPoints": 10.0, "totalProjectedPointsLive": 98.4},
                 "away": {"teamId": 2, "totalPointsLive": 77.1}},
                {"id": 2, "matchupPeriodId": 3, "home": {"teamId": 3, "totalPoints": 0.0}},
                {"id": 3, "matchupPeriodId": 4,
                 "home": {"teamId": 1}, "away": {"teamId": 3}}
            ]
        });
        let resp: ScheduleResponse = serde_json::from_value(raw).unwrap();
        let matchups = matchups_for_period(resp.schedule, 3);

        assert_eq!(matchups.len(), 1);
        assert_eq!(matchups[0].matchup_id, 1);
        assert_eq!(matchups[0].score_a, 98.4);
        assert_eq!(matchups[0].score_b, 77.1);
    }

    #[test]
    fn test_team_display_name_fallbacks() {
        let team: Team = serde_json::from_value(json!({
            "id": 4, "location": "Gridiron ", "nickname": "Goblins"
        }))
        .unwrap();
        assert_eq!(team.display_name(), "Gridiron Goblins");

        let bare: Team = serde_json::from_value(json!({"id": 9})).unwrap();
        assert_eq!(bare.display_name(), "Team 9");
    }

    #[test]
    fn test_new_builds_key_from_config_season() {
        let config = EspnConfig {
            season: 2023,
            ..Default::default()
        };
        let source = EspnSource::new(&config, "555").unwrap();
        assert_eq!(source.key().to_string(), "leagues/espn-555/years/2023");
        assert!(source.cookie.is_none());
    }
}
