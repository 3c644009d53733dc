use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id; also the primary key of the accounts table.
pub type UserId = u64;

/// Rounds a player may commit between two daily resets.
pub const DAILY_PLAY_LIMIT: u32 = 10;

/// One row of the accounts table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub points: i64,
    /// rounds committed since the last daily reset
    pub plays: u32,
    pub phone: Option<String>,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub last_play: Option<DateTime<Utc>>,
}

impl Account {
    /// A freshly onboarded account: no points, no plays, not blocked, no phone.
    pub fn new(user_id: UserId, profile: Profile, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            username: profile.username,
            points: 0,
            plays: 0,
            phone: None,
            is_blocked: false,
            created_at: now,
            last_play: None,
        }
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// Profile fields captured at onboarding
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

/// Immutable audit entry for one committed round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// store-wide commit sequence; orders records even when timestamps tie
    pub seq: u64,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub user_roll: u8,
    pub bot_roll: u8,
    pub outcome: Outcome,
    pub points_change: i64,
}

/// A history record staged inside a transaction. The store assigns the
/// sequence number and timestamp at commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewHistoryRecord {
    pub user_id: UserId,
    pub user_roll: u8,
    pub bot_roll: u8,
    pub outcome: Outcome,
    pub points_change: i64,
}

impl NewHistoryRecord {
    pub fn into_record(self, seq: u64, created_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            seq,
            user_id: self.user_id,
            created_at,
            user_roll: self.user_roll,
            bot_roll: self.bot_roll,
            outcome: self.outcome,
            points_change: self.points_change,
        }
    }
}

/// What a successful `play_round` hands back to the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RoundOutcome {
    pub user_roll: u8,
    pub bot_roll: u8,
    pub outcome: Outcome,
    pub points_change: i64,
    pub new_total_points: i64,
    /// commit time; also the history record's `created_at`
    pub played_at: DateTime<Utc>,
}

/// Read-only snapshot returned by `get_stats`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub points: i64,
    pub plays: u32,
}
