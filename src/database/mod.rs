use crate::protocol::{Difficulty, MatchId, RaceTextId, Tier, UserId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

mod memory;
pub mod seed;

pub use memory::InMemoryRaceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Player,
    Admin,
}

/// A registered player and their running tournament aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub tier: Tier,
    pub total_games: u32,
    pub tournaments_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_wins: u32,
    pub highest_wpm: f64,
    pub avg_wpm: f64,
    pub accuracy_avg: f64,
    pub tournament_points: i64,
}

impl UserProfile {
    /// A fresh profile with zeroed aggregates.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            tier: Tier::Bronze,
            total_games: 0,
            tournaments_played: 0,
            wins: 0,
            losses: 0,
            total_wins: 0,
            highest_wpm: 0.0,
            avg_wpm: 0.0,
            accuracy_avg: 0.0,
            tournament_points: 0,
        }
    }
}

/// A catalog text that matches can race on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceText {
    pub id: RaceTextId,
    pub title: String,
    pub difficulty: Difficulty,
    pub text: String,
    /// Race duration in seconds
    pub time_limit: u32,
    pub is_active: bool,
    pub created_by: UserId,
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub difficulty: Difficulty,
    pub text_id: RaceTextId,
    pub text: String,
    pub duration_secs: u32,
    pub player_limit: u8,
    pub started_at: DateTime<Utc>,
}

/// Durable match row. `text` and `duration_secs` are a snapshot taken at formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: MatchId,
    pub difficulty: Difficulty,
    pub text_id: RaceTextId,
    pub text: String,
    pub duration_secs: u32,
    pub player_limit: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchUpdate {
    pub ended_at: Option<DateTime<Utc>>,
}

/// One user's row in a match; unique on `(match_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub placement: Option<u32>,
    pub points_earned: i64,
    pub wpm: f64,
    pub accuracy: f64,
    pub progress: f64,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ParticipantRecord {
    #[must_use]
    pub fn pending(match_id: MatchId, user_id: UserId) -> Self {
        Self {
            match_id,
            user_id,
            placement: None,
            points_earned: 0,
            wpm: 0.0,
            accuracy: 0.0,
            progress: 0.0,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantUpdate {
    pub placement: u32,
    pub points_earned: i64,
    pub wpm: f64,
    pub accuracy: f64,
    pub progress: f64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub user_id: UserId,
    pub match_id: MatchId,
    pub text_id: RaceTextId,
    pub difficulty: Difficulty,
    pub wpm: f64,
    pub accuracy: f64,
    pub error_count: u32,
    /// Whole seconds, at least 1
    pub time_taken: u32,
    /// Length of the race text in characters
    pub text_length: usize,
    pub won: bool,
}

/// Append-only typing result; tournament rows always carry `is_tournament`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: uuid::Uuid,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub text_id: RaceTextId,
    pub difficulty: Difficulty,
    pub wpm: f64,
    pub accuracy: f64,
    pub error_count: u32,
    pub time_taken: u32,
    pub text_length: usize,
    pub is_tournament: bool,
    pub won: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user outcome of a settled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementDelta {
    pub points_delta: i64,
    pub won: bool,
}

/// Errors raised by store implementations for contract violations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("match {0} does not exist")]
    UnknownMatch(MatchId),

    #[error("participant ({match_id}, {user_id}) already exists")]
    DuplicateParticipant { match_id: MatchId, user_id: UserId },
}

/// Persistence boundary for matchmaking and settlement.
#[async_trait]
pub trait RaceStore: Send + Sync {
    /// Pick one active, admin-authored text for the difficulty, uniformly at random.
    async fn find_eligible_race_text(&self, difficulty: Difficulty) -> Result<Option<RaceText>>;

    async fn create_match(&self, new_match: NewMatch) -> Result<MatchRecord>;

    /// Insert default participant rows; fails on a duplicate `(match, user)` pair.
    async fn create_participants(&self, match_id: &MatchId, user_ids: &[UserId]) -> Result<()>;

    async fn update_match(&self, match_id: &MatchId, update: MatchUpdate) -> Result<()>;

    async fn upsert_participant(
        &self,
        match_id: &MatchId,
        user_id: &UserId,
        update: ParticipantUpdate,
    ) -> Result<()>;

    async fn append_result(&self, result: NewResult) -> Result<ResultRecord>;

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserProfile>>;

    async fn get_user_points(&self, user_id: &UserId) -> Result<Option<i64>>;

    /// Atomically apply a point delta (floored at zero), recompute the tier and
    /// bump the tournament counters. `None` when the user does not exist.
    async fn apply_user_settlement(
        &self,
        user_id: &UserId,
        delta: SettlementDelta,
    ) -> Result<Option<UserProfile>>;

    /// Rebuild totals, averages and best WPM from the user's full result history.
    async fn recompute_user_aggregates(&self, user_id: &UserId) -> Result<Option<UserProfile>>;

    async fn health_check(&self) -> bool;
}

/// Storage configuration; in-memory only, optionally seeded from a JSON file.
#[derive(Debug, Clone, Default)]
pub enum DatabaseConfig {
    #[default]
    InMemory,
    SeededInMemory { seed_path: PathBuf },
}

impl DatabaseConfig {
    #[must_use]
    pub fn from_storage_config(config: &crate::config::StorageConfig) -> Self {
        match config
            .seed_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            Some(path) => Self::SeededInMemory {
                seed_path: PathBuf::from(path),
            },
            None => Self::InMemory,
        }
    }
}

/// Create the race store described by the configuration.
pub async fn create_database(config: DatabaseConfig) -> Result<Arc<dyn RaceStore>> {
    match config {
        DatabaseConfig::InMemory => Ok(Arc::new(InMemoryRaceStore::new())),
        DatabaseConfig::SeededInMemory { seed_path } => {
            let store = InMemoryRaceStore::new();
            let document = seed::load_seed_file(&seed_path)?;
            let summary = seed::apply_seed(&store, document).await?;
            tracing::info!(
                path = %seed_path.display(),
                users = summary.users,
                texts = summary.texts,
                "Seeded in-memory race store"
            );
            Ok(Arc::new(store))
        }
    }
}
