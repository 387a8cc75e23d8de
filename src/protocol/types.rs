use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ConnectionId = Uuid;
pub type UserId = Uuid;
pub type MatchId = Uuid;
pub type RaceTextId = Uuid;

/// Fan-out room name; every match owns exactly one.
pub type RoomId = String;

/// Player counts a queue can target.
pub const ALLOWED_PLAYER_LIMITS: [u8; 2] = [2, 4];
pub const DEFAULT_PLAYER_LIMIT: u8 = 4;

/// Fewest live players a match can start with.
pub const MIN_MATCH_PLAYERS: usize = 2;

#[must_use]
pub fn match_room_id(match_id: &MatchId) -> RoomId {
    format!("match:{match_id}")
}

/// Race difficulty bucket. Unknown input normalizes to [`Difficulty::Easy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
        }
    }

    /// Case-insensitive parse; anything unrecognised (or absent) is `Easy`.
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let wanted = raw.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|difficulty| difficulty.as_str() == wanted)
            .unwrap_or_default()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a requested player count to one of [`ALLOWED_PLAYER_LIMITS`].
#[must_use]
pub fn normalize_player_limit(raw: Option<f64>) -> u8 {
    raw.filter(|value| value.fract() == 0.0)
        .and_then(|value| {
            ALLOWED_PLAYER_LIMITS
                .into_iter()
                .find(|limit| f64::from(*limit) == value)
        })
        .unwrap_or(DEFAULT_PLAYER_LIMIT)
}

/// Competitive tier derived from tournament points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    #[must_use]
    pub const fn from_points(points: i64) -> Self {
        if points >= 900 {
            Self::Diamond
        } else if points >= 500 {
            Self::Platinum
        } else if points >= 250 {
            Self::Gold
        } else if points >= 100 {
            Self::Silver
        } else {
            Self::Bronze
        }
    }
}

/// Why a racer left before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    LeftMatch,
    Disconnect,
}

impl DropReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LeftMatch => "left_match",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final standing of a participant at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Finished,
    TimedOut,
    Forfeited,
}

impl ParticipantStatus {
    /// Sort bucket: finishers first, forfeiters last.
    #[must_use]
    pub const fn rank_bucket(&self) -> u8 {
        match self {
            Self::Finished => 0,
            Self::TimedOut => 1,
            Self::Forfeited => 2,
        }
    }
}
