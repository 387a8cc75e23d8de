use super::{
    MatchRecord, MatchUpdate, NewMatch, NewResult, ParticipantRecord, ParticipantUpdate,
    RaceStore, RaceText, ResultRecord, SettlementDelta, StoreError, UserProfile, UserRole,
};
use crate::protocol::{Difficulty, MatchId, RaceTextId, Tier, UserId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, UserProfile>,
    texts: HashMap<RaceTextId, RaceText>,
    matches: HashMap<MatchId, MatchRecord>,
    participants: HashMap<(MatchId, UserId), ParticipantRecord>,
    results: Vec<ResultRecord>,
}

/// In-memory race store for single-process deployments and tests.
///
/// All collections sit behind one lock so multi-row updates are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRaceStore {
    state: Arc<RwLock<StoreState>>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl InMemoryRaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user profile.
    pub async fn insert_user(&self, profile: UserProfile) {
        self.state.write().await.users.insert(profile.id, profile);
    }

    /// Insert or replace a catalog text.
    pub async fn insert_race_text(&self, text: RaceText) {
        self.state.write().await.texts.insert(text.id, text);
    }

    pub async fn match_record(&self, match_id: &MatchId) -> Option<MatchRecord> {
        self.state.read().await.matches.get(match_id).cloned()
    }

    pub async fn match_count(&self) -> usize {
        self.state.read().await.matches.len()
    }

    /// Participant rows for a match, in no particular order.
    pub async fn participants(&self, match_id: &MatchId) -> Vec<ParticipantRecord> {
        self.state
            .read()
            .await
            .participants
            .values()
            .filter(|p| p.match_id == *match_id)
            .cloned()
            .collect()
    }

    pub async fn results_for_user(&self, user_id: &UserId) -> Vec<ResultRecord> {
        self.state
            .read()
            .await
            .results
            .iter()
            .filter(|r| r.user_id == *user_id)
            .cloned()
            .collect()
    }

    pub async fn results_for_match(&self, match_id: &MatchId) -> Vec<ResultRecord> {
        self.state
            .read()
            .await
            .results
            .iter()
            .filter(|r| r.match_id == *match_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RaceStore for InMemoryRaceStore {
    async fn find_eligible_race_text(&self, difficulty: Difficulty) -> Result<Option<RaceText>> {
        let state = self.state.read().await;
        let eligible: Vec<&RaceText> = state
            .texts
            .values()
            .filter(|text| text.is_active && text.difficulty == difficulty)
            .filter(|text| {
                state
                    .users
                    .get(&text.created_by)
                    .is_some_and(|author| author.role == UserRole::Admin)
            })
            .collect();

        if eligible.is_empty() {
            return Ok(None);
        }
        Ok(eligible.get(fastrand::usize(..eligible.len())).map(|t| (*t).clone()))
    }

    async fn create_match(&self, new_match: NewMatch) -> Result<MatchRecord> {
        let record = MatchRecord {
            id: Uuid::new_v4(),
            difficulty: new_match.difficulty,
            text_id: new_match.text_id,
            text: new_match.text,
            duration_secs: new_match.duration_secs,
            player_limit: new_match.player_limit,
            started_at: new_match.started_at,
            ended_at: None,
        };
        self.state
            .write()
            .await
            .matches
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn create_participants(&self, match_id: &MatchId, user_ids: &[UserId]) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.matches.contains_key(match_id) {
            return Err(StoreError::UnknownMatch(*match_id).into());
        }
        // Validate the whole batch before inserting anything.
        for (index, user_id) in user_ids.iter().enumerate() {
            let repeated_in_batch = user_ids.iter().take(index).any(|u| u == user_id);
            if repeated_in_batch || state.participants.contains_key(&(*match_id, *user_id)) {
                return Err(StoreError::DuplicateParticipant {
                    match_id: *match_id,
                    user_id: *user_id,
                }
                .into());
            }
        }
        for user_id in user_ids {
            state.participants.insert(
                (*match_id, *user_id),
                ParticipantRecord::pending(*match_id, *user_id),
            );
        }
        Ok(())
    }

    async fn update_match(&self, match_id: &MatchId, update: MatchUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .matches
            .get_mut(match_id)
            .ok_or(StoreError::UnknownMatch(*match_id))?;
        if update.ended_at.is_some() {
            record.ended_at = update.ended_at;
        }
        Ok(())
    }

    async fn upsert_participant(
        &self,
        match_id: &MatchId,
        user_id: &UserId,
        update: ParticipantUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .participants
            .entry((*match_id, *user_id))
            .or_insert_with(|| ParticipantRecord::pending(*match_id, *user_id));
        row.placement = Some(update.placement);
        row.points_earned = update.points_earned;
        row.wpm = update.wpm;
        row.accuracy = update.accuracy;
        row.progress = update.progress;
        row.finished_at = Some(update.finished_at);
        Ok(())
    }

    async fn append_result(&self, result: NewResult) -> Result<ResultRecord> {
        let record = ResultRecord {
            id: Uuid::new_v4(),
            user_id: result.user_id,
            match_id: result.match_id,
            text_id: result.text_id,
            difficulty: result.difficulty,
            wpm: result.wpm,
            accuracy: result.accuracy,
            error_count: result.error_count,
            time_taken: result.time_taken.max(1),
            text_length: result.text_length,
            is_tournament: true,
            won: result.won,
            created_at: Utc::now(),
        };
        self.state.write().await.results.push(record.clone());
        Ok(record)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn get_user_points(&self, user_id: &UserId) -> Result<Option<i64>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .get(user_id)
            .map(|u| u.tournament_points))
    }

    async fn apply_user_settlement(
        &self,
        user_id: &UserId,
        delta: SettlementDelta,
    ) -> Result<Option<UserProfile>> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(None);
        };
        user.tournament_points = user
            .tournament_points
            .saturating_add(delta.points_delta)
            .max(0);
        user.tier = Tier::from_points(user.tournament_points);
        user.tournaments_played += 1;
        if delta.won {
            user.wins += 1;
            user.total_wins += 1;
        } else {
            user.losses += 1;
        }
        Ok(Some(user.clone()))
    }

    async fn recompute_user_aggregates(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(None);
        };

        let (count, wpm_sum, accuracy_sum, best_wpm) = state
            .results
            .iter()
            .filter(|r| r.user_id == *user_id)
            .fold((0u32, 0.0, 0.0, 0.0_f64), |(n, wpm, acc, best), r| {
                (n + 1, wpm + r.wpm, acc + r.accuracy, best.max(r.wpm))
            });

        user.total_games = count;
        if count == 0 {
            user.avg_wpm = 0.0;
            user.accuracy_avg = 0.0;
            user.highest_wpm = 0.0;
        } else {
            user.avg_wpm = round2(wpm_sum / f64::from(count));
            user.accuracy_avg = round2(accuracy_sum / f64::from(count));
            user.highest_wpm = round2(best_wpm);
        }
        user.tier = Tier::from_points(user.tournament_points);
        Ok(Some(user.clone()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_admin_text(difficulty: Difficulty) -> (InMemoryRaceStore, RaceText) {
        let store = InMemoryRaceStore::new();
        let admin = UserProfile::new(Uuid::new_v4(), "Admin", UserRole::Admin);
        let text = RaceText {
            id: Uuid::new_v4(),
            title: "Warmup".into(),
            difficulty,
            text: "steady hands type clean lines".into(),
            time_limit: 60,
            is_active: true,
            created_by: admin.id,
        };
        store.insert_user(admin).await;
        store.insert_race_text(text.clone()).await;
        (store, text)
    }

    fn new_match(text: &RaceText) -> NewMatch {
        NewMatch {
            difficulty: text.difficulty,
            text_id: text.id,
            text: text.text.clone(),
            duration_secs: text.time_limit,
            player_limit: 2,
            started_at: Utc::now(),
        }
    }

    fn result_for(user_id: UserId, match_id: MatchId, wpm: f64, accuracy: f64) -> NewResult {
        NewResult {
            user_id,
            match_id,
            text_id: Uuid::new_v4(),
            difficulty: Difficulty::Easy,
            wpm,
            accuracy,
            error_count: 0,
            time_taken: 30,
            text_length: 40,
            won: false,
        }
    }

    #[tokio::test]
    async fn eligible_text_requires_admin_author_and_active_flag() {
        let (store, text) = store_with_admin_text(Difficulty::Hard).await;
        let player = UserProfile::new(Uuid::new_v4(), "Nova", UserRole::Player);
        store
            .insert_race_text(RaceText {
                id: Uuid::new_v4(),
                created_by: player.id,
                ..text.clone()
            })
            .await;
        store.insert_user(player).await;
        store
            .insert_race_text(RaceText {
                id: Uuid::new_v4(),
                is_active: false,
                ..text.clone()
            })
            .await;

        for _ in 0..20 {
            let picked = store
                .find_eligible_race_text(Difficulty::Hard)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(picked.id, text.id);
        }
        assert!(store
            .find_eligible_race_text(Difficulty::Easy)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_participants_are_rejected_atomically() {
        let (store, text) = store_with_admin_text(Difficulty::Easy).await;
        let record = store.create_match(new_match(&text)).await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.create_participants(&record.id, &[a]).await.unwrap();
        let err = store
            .create_participants(&record.id, &[b, a])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DuplicateParticipant { .. })
        ));
        assert_eq!(store.participants(&record.id).await.len(), 1);
    }

    #[tokio::test]
    async fn settlement_floors_points_at_zero_and_updates_tier() {
        let store = InMemoryRaceStore::new();
        let mut user = UserProfile::new(Uuid::new_v4(), "Kai", UserRole::Player);
        user.tournament_points = 1;
        store.insert_user(user.clone()).await;

        let after = store
            .apply_user_settlement(
                &user.id,
                SettlementDelta {
                    points_delta: -2,
                    won: false,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.tournament_points, 0);
        assert_eq!(after.losses, 1);
        assert_eq!(after.tournaments_played, 1);

        let mut rich = UserProfile::new(Uuid::new_v4(), "Zara", UserRole::Player);
        rich.tournament_points = 95;
        store.insert_user(rich.clone()).await;
        let after = store
            .apply_user_settlement(
                &rich.id,
                SettlementDelta {
                    points_delta: 10,
                    won: true,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.tournament_points, 105);
        assert_eq!(after.tier, Tier::Silver);
        assert_eq!((after.wins, after.total_wins, after.losses), (1, 1, 0));
        assert_eq!(store.get_user_points(&rich.id).await.unwrap(), Some(105));
    }

    #[tokio::test]
    async fn settlement_for_unknown_user_is_none() {
        let store = InMemoryRaceStore::new();
        let outcome = store
            .apply_user_settlement(
                &Uuid::new_v4(),
                SettlementDelta {
                    points_delta: 10,
                    won: true,
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn aggregates_are_rebuilt_from_history() {
        let store = InMemoryRaceStore::new();
        let user = UserProfile::new(Uuid::new_v4(), "Ivy", UserRole::Player);
        store.insert_user(user.clone()).await;
        let match_id = Uuid::new_v4();

        store
            .append_result(result_for(user.id, match_id, 50.0, 90.0))
            .await
            .unwrap();
        store
            .append_result(result_for(user.id, match_id, 61.34, 95.5))
            .await
            .unwrap();

        let profile = store
            .recompute_user_aggregates(&user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.total_games, 2);
        assert_eq!(profile.avg_wpm, 55.67);
        assert_eq!(profile.accuracy_avg, 92.75);
        assert_eq!(profile.highest_wpm, 61.34);
        assert_eq!(store.results_for_match(&match_id).await.len(), 2);
    }

    #[tokio::test]
    async fn upsert_creates_missing_participant_rows() {
        let store = InMemoryRaceStore::new();
        let match_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        store
            .upsert_participant(
                &match_id,
                &user_id,
                ParticipantUpdate {
                    placement: 1,
                    points_earned: 10,
                    wpm: 70.0,
                    accuracy: 99.0,
                    progress: 100.0,
                    finished_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        let rows = store.participants(&match_id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].placement, Some(1));
    }

    #[tokio::test]
    async fn ending_an_unknown_match_fails() {
        let store = InMemoryRaceStore::new();
        let result = store
            .update_match(
                &Uuid::new_v4(),
                MatchUpdate {
                    ended_at: Some(Utc::now()),
                },
            )
            .await;
        assert!(result.is_err());
    }
}
