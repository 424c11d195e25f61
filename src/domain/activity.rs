use serde::{Deserialize, Serialize};

/// Single roster move inside an activity event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAction {
    /// e.g. "FA ADDED", "WAIVER ADDED", "DROPPED", "TRADED"
    pub action_kind: String,
    pub participant_id: i64,
    pub team_id: i64,
}

/// A provider activity entry (transaction, waiver claim, trade)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Provider-assigned id, unique within a league-year
    pub id: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub actions: Vec<ActivityAction>,
}

impl ActivityEvent {
    pub fn new(id: impl Into<String>, timestamp: i64, actions: Vec<ActivityAction>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            actions,
        }
    }
}

pub const ACTION_FA_ADDED: &str = "FA ADDED";
pub const ACTION_WAIVER_ADDED: &str = "WAIVER ADDED";
pub const ACTION_DROPPED: &str = "DROPPED";
pub const ACTION_TRADED: &str = "TRADED";
