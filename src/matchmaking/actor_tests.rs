use super::*;
use crate::coordination::{InMemoryMessageCoordinator, MessageCoordinator};
use crate::database::{
    InMemoryRaceStore, MatchRecord, MatchUpdate, NewMatch, NewResult, ParticipantUpdate,
    RaceStore, RaceText, ResultRecord, SettlementDelta, UserProfile, UserRole,
};
use crate::protocol::MatchId;
use async_trait::async_trait;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    Difficulty, DropReason, ErrorCode, MatchFoundPayload, ParticipantStatus, ServerMessage, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

struct Racer {
    entry: QueueEntry,
    inbox: mpsc::Receiver<Arc<ServerMessage>>,
}

struct Harness {
    store: InMemoryRaceStore,
    fanout: Arc<InMemoryMessageCoordinator>,
    registry: Arc<MatchmakingRegistry>,
    metrics: Arc<ServerMetrics>,
    factory: MatchFactory,
}

fn settings() -> RaceSettings {
    RaceSettings {
        countdown: Duration::from_secs(3),
        finalize_grace: Duration::from_secs(5),
        eviction_grace: Duration::from_secs(10),
        forfeit_penalty: 2,
        event_buffer: 32,
    }
}

/// In-memory store whose match creation takes a while.
struct SlowStore {
    inner: InMemoryRaceStore,
    create_delay: Duration,
}

#[async_trait]
impl RaceStore for SlowStore {
    async fn find_eligible_race_text(
        &self,
        difficulty: Difficulty,
    ) -> anyhow::Result<Option<RaceText>> {
        self.inner.find_eligible_race_text(difficulty).await
    }

    async fn create_match(&self, new_match: NewMatch) -> anyhow::Result<MatchRecord> {
        tokio::time::sleep(self.create_delay).await;
        self.inner.create_match(new_match).await
    }

    async fn create_participants(
        &self,
        match_id: &MatchId,
        user_ids: &[UserId],
    ) -> anyhow::Result<()> {
        self.inner.create_participants(match_id, user_ids).await
    }

    async fn update_match(&self, match_id: &MatchId, update: MatchUpdate) -> anyhow::Result<()> {
        self.inner.update_match(match_id, update).await
    }

    async fn upsert_participant(
        &self,
        match_id: &MatchId,
        user_id: &UserId,
        update: ParticipantUpdate,
    ) -> anyhow::Result<()> {
        self.inner.upsert_participant(match_id, user_id, update).await
    }

    async fn append_result(&self, result: NewResult) -> anyhow::Result<ResultRecord> {
        self.inner.append_result(result).await
    }

    async fn get_user(&self, user_id: &UserId) -> anyhow::Result<Option<UserProfile>> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_points(&self, user_id: &UserId) -> anyhow::Result<Option<i64>> {
        self.inner.get_user_points(user_id).await
    }

    async fn apply_user_settlement(
        &self,
        user_id: &UserId,
        delta: SettlementDelta,
    ) -> anyhow::Result<Option<UserProfile>> {
        self.inner.apply_user_settlement(user_id, delta).await
    }

    async fn recompute_user_aggregates(
        &self,
        user_id: &UserId,
    ) -> anyhow::Result<Option<UserProfile>> {
        self.inner.recompute_user_aggregates(user_id).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

async fn harness(with_text: bool) -> Harness {
    harness_with_delay(with_text, Duration::ZERO).await
}

async fn harness_with_delay(with_text: bool, create_delay: Duration) -> Harness {
    let store = InMemoryRaceStore::new();
    let admin = Uuid::new_v4();
    store
        .insert_user(UserProfile::new(admin, "Admin", UserRole::Admin))
        .await;
    if with_text {
        store
            .insert_race_text(RaceText {
                id: Uuid::new_v4(),
                title: "Warmup".to_string(),
                difficulty: Difficulty::Easy,
                text: "pack my box with five dozen liquor jugs".to_string(),
                time_limit: 30,
                is_active: true,
                created_by: admin,
            })
            .await;
    }

    let fanout = Arc::new(InMemoryMessageCoordinator::new());
    let registry = Arc::new(MatchmakingRegistry::new());
    let metrics = Arc::new(ServerMetrics::new());
    let backing: Arc<dyn RaceStore> = if create_delay.is_zero() {
        Arc::new(store.clone())
    } else {
        Arc::new(SlowStore {
            inner: store.clone(),
            create_delay,
        })
    };
    let deps = SessionDeps {
        store: backing,
        fanout: fanout.clone(),
        registry: registry.clone(),
        metrics: metrics.clone(),
    };
    Harness {
        factory: MatchFactory::new(deps, settings()),
        store,
        fanout,
        registry,
        metrics,
    }
}

impl Harness {
    async fn racer(&self, name: &str) -> Racer {
        let user_id = Uuid::new_v4();
        self.store
            .insert_user(UserProfile::new(user_id, name, UserRole::Player))
            .await;
        let (tx, inbox) = mpsc::channel(32);
        let connection_id = Uuid::new_v4();
        self.fanout
            .register_local_client(connection_id, tx)
            .await
            .unwrap();
        Racer {
            entry: QueueEntry {
                connection_id,
                user_id,
                display_name: name.to_string(),
            },
            inbox,
        }
    }

    async fn form(&self, racers: &[&Racer]) -> FormedMatch {
        let candidates = racers.iter().map(|r| r.entry.clone()).collect();
        self.factory
            .try_form_match(Difficulty::Easy, candidates, 2)
            .await
            .expect("match forms")
    }
}

async fn next_of_kind(racer: &mut Racer, kind: &str) -> Arc<ServerMessage> {
    loop {
        let message = timeout(Duration::from_secs(120), racer.inbox.recv())
            .await
            .expect("message before timeout")
            .expect("channel open");
        if message.kind() == kind {
            return message;
        }
    }
}

fn finish(user_id: UserId, seconds: f64) -> SessionEvent {
    SessionEvent::Finish {
        user_id,
        report: FinishReport {
            wpm: 60.0,
            accuracy: 95.0,
            error_count: 1.0,
            time_taken: Some(seconds),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn formed_match_announces_and_binds_racers() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;

    let formed = h.form(&[&a, &b]).await;

    let found = next_of_kind(&mut a, "matchFound").await;
    let ServerMessage::MatchFound(payload) = found.as_ref() else {
        panic!("expected matchFound");
    };
    let MatchFoundPayload {
        match_id,
        player_limit,
        countdown_seconds,
        duration,
        ..
    } = payload.as_ref();
    assert_eq!(*match_id, formed.match_id);
    assert_eq!(*player_limit, 2);
    assert_eq!(*countdown_seconds, 3);
    assert_eq!(*duration, 30);

    assert_eq!(h.registry.bound_match(&b.entry.connection_id), Some(formed.match_id));
    assert_eq!(h.store.participants(&formed.match_id).await.len(), 2);
    assert_eq!(h.metrics.snapshot().matches.active_matches, 1);
}

#[tokio::test(start_paused = true)]
async fn all_finishers_settle_and_session_is_evicted() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    formed.handle.send(finish(b.entry.user_id, 20.0)).await;
    formed.handle.send(finish(a.entry.user_id, 25.0)).await;

    let results = next_of_kind(&mut a, "results").await;
    let ServerMessage::Results(payload) = results.as_ref() else {
        panic!("expected results");
    };
    assert_eq!(payload.rankings.len(), 2);
    assert!(payload
        .rankings
        .iter()
        .all(|r| r.status == ParticipantStatus::Finished));
    assert_eq!(
        payload.rankings.iter().map(|r| r.points_earned).sum::<i64>(),
        15
    );

    let record = h.store.match_record(&formed.match_id).await.unwrap();
    assert!(record.ended_at.is_some());
    assert_eq!(h.store.results_for_match(&formed.match_id).await.len(), 2);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(h.registry.session(&formed.match_id).is_none());
    assert!(h.registry.bound_match(&a.entry.connection_id).is_none());
    assert_eq!(h.metrics.snapshot().matches.active_matches, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_settles_idle_racers_as_timed_out() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    formed
        .handle
        .send(SessionEvent::Progress {
            user_id: a.entry.user_id,
            progress: 60.0,
            wpm: 48.0,
            accuracy: 92.0,
        })
        .await;

    let results = next_of_kind(&mut a, "results").await;
    let ServerMessage::Results(payload) = results.as_ref() else {
        panic!("expected results");
    };
    assert!(payload
        .rankings
        .iter()
        .all(|r| r.status == ParticipantStatus::TimedOut && r.time_taken == 30));
    assert_eq!(payload.rankings[0].user_id, a.entry.user_id);
    assert!(payload.rankings[0].won);
}

#[tokio::test(start_paused = true)]
async fn forfeit_in_two_player_match_settles_immediately() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;

    let (ack_tx, ack_rx) = oneshot::channel();
    formed
        .handle
        .send(SessionEvent::Drop {
            user_id: b.entry.user_id,
            reason: DropReason::LeftMatch,
            ack: Some(ack_tx),
        })
        .await;
    assert!(ack_rx.await.unwrap());

    let status = next_of_kind(&mut a, "playerStatus").await;
    assert!(matches!(
        status.as_ref(),
        ServerMessage::PlayerStatus {
            status: ParticipantStatus::Forfeited,
            reason: DropReason::LeftMatch,
            ..
        }
    ));

    let results = next_of_kind(&mut a, "results").await;
    let ServerMessage::Results(payload) = results.as_ref() else {
        panic!("expected results");
    };
    let quitter = payload
        .rankings
        .iter()
        .find(|r| r.user_id == b.entry.user_id)
        .unwrap();
    assert_eq!(quitter.points_earned, -2);
    assert_eq!(quitter.placement, 2);
    assert_eq!(h.metrics.snapshot().events.forfeits, 1);
}

#[tokio::test(start_paused = true)]
async fn late_drop_after_settlement_is_refused() {
    let h = harness(true).await;
    let a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    formed.handle.send(finish(a.entry.user_id, 10.0)).await;
    formed.handle.send(finish(b.entry.user_id, 12.0)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (ack_tx, ack_rx) = oneshot::channel();
    formed
        .handle
        .send(SessionEvent::Drop {
            user_id: a.entry.user_id,
            reason: DropReason::LeftMatch,
            ack: Some(ack_tx),
        })
        .await;
    assert!(!ack_rx.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn drain_cancels_without_results() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;
    next_of_kind(&mut a, "matchFound").await;

    let summary = h.registry.drain().await;
    assert_eq!(summary.sessions_cancelled, 1);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(a.inbox.try_recv().is_err());
    let record = h.store.match_record(&formed.match_id).await.unwrap();
    assert!(record.ended_at.is_none());
    assert_eq!(h.metrics.snapshot().matches.matches_cancelled, 1);
}

#[tokio::test]
async fn missing_text_notifies_candidates() {
    let h = harness(false).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;

    let err = h
        .factory
        .try_form_match(Difficulty::Easy, vec![a.entry.clone(), b.entry.clone()], 2)
        .await
        .unwrap_err();
    assert!(matches!(err, FormationError::NoRaceText(Difficulty::Easy)));

    let message = next_of_kind(&mut a, "error").await;
    assert!(matches!(
        message.as_ref(),
        ServerMessage::Error {
            error_code: Some(ErrorCode::NoRaceTextAvailable),
            ..
        }
    ));
    assert_eq!(h.store.match_count().await, 0);
}

#[tokio::test]
async fn disconnected_candidates_are_filtered_out() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    h.fanout
        .unregister_local_client(&b.entry.connection_id)
        .await
        .unwrap();

    let err = h
        .factory
        .try_form_match(Difficulty::Easy, vec![a.entry.clone(), b.entry.clone()], 2)
        .await
        .unwrap_err();
    assert!(matches!(err, FormationError::NotEnoughPlayers { live: 1 }));

    let message = next_of_kind(&mut a, "error").await;
    assert!(matches!(
        message.as_ref(),
        ServerMessage::Error {
            error_code: Some(ErrorCode::NotEnoughPlayers),
            ..
        }
    ));
    assert_eq!(h.metrics.snapshot().matches.formation_failures, 1);
}

fn results_in(inbox: &mut mpsc::Receiver<Arc<ServerMessage>>) -> usize {
    let mut count = 0;
    while let Ok(message) = inbox.try_recv() {
        if message.kind() == "results" {
            count += 1;
        }
    }
    count
}

#[tokio::test(start_paused = true)]
async fn slow_storage_does_not_delay_the_race_start() {
    let h = harness_with_delay(true, Duration::from_secs(1)).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;

    let formation_began = tokio::time::Instant::now();
    let formed = h.form(&[&a, &b]).await;
    assert!(formation_began.elapsed() >= Duration::from_secs(1));
    next_of_kind(&mut a, "matchFound").await;

    // Countdown is 3s from when formation began, not from when storage returned.
    tokio::time::sleep_until(formation_began + Duration::from_millis(3_500)).await;
    formed
        .handle
        .send(SessionEvent::Progress {
            user_id: a.entry.user_id,
            progress: 10.0,
            wpm: 40.0,
            accuracy: 99.0,
        })
        .await;

    let update = timeout(Duration::from_millis(200), next_of_kind(&mut a, "progressUpdate"))
        .await
        .expect("progress accepted right after the advertised start");
    let ServerMessage::ProgressUpdate { players, .. } = update.as_ref() else {
        panic!("expected progressUpdate");
    };
    let nova = players
        .iter()
        .find(|p| p.user_id == a.entry.user_id)
        .unwrap();
    assert!((nova.progress - 10.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn racer_disconnecting_during_formation_is_forfeited() {
    let h = harness_with_delay(true, Duration::from_secs(1)).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;

    let factory = h.factory.clone();
    let candidates = vec![a.entry.clone(), b.entry.clone()];
    let forming =
        tokio::spawn(async move { factory.try_form_match(Difficulty::Easy, candidates, 2).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    h.fanout
        .unregister_local_client(&b.entry.connection_id)
        .await
        .unwrap();
    let formed = forming.await.unwrap().expect("match forms");
    assert_eq!(formed.players.len(), 2);
    assert!(h.registry.bound_match(&b.entry.connection_id).is_none());

    let settled_by = tokio::time::Instant::now() + Duration::from_secs(1);
    let results = next_of_kind(&mut a, "results").await;
    assert!(tokio::time::Instant::now() <= settled_by);
    let ServerMessage::Results(payload) = results.as_ref() else {
        panic!("expected results");
    };
    let kai = payload
        .rankings
        .iter()
        .find(|r| r.user_id == b.entry.user_id)
        .unwrap();
    assert_eq!(kai.status, ParticipantStatus::Forfeited);
    assert_eq!(kai.points_earned, -2);
    assert_eq!(h.metrics.snapshot().events.forfeits, 1);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_triggers_settle_once() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed = h.form(&[&a, &b]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    formed.handle.send(finish(b.entry.user_id, 20.0)).await;
    formed.handle.send(finish(a.entry.user_id, 25.0)).await;
    let (ack_tx, ack_rx) = oneshot::channel();
    formed
        .handle
        .send(SessionEvent::Drop {
            user_id: a.entry.user_id,
            reason: DropReason::LeftMatch,
            ack: Some(ack_tx),
        })
        .await;
    assert!(!ack_rx.await.unwrap());

    // Past both the deadline and eviction.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(results_in(&mut a.inbox), 1);
    assert_eq!(h.store.results_for_match(&formed.match_id).await.len(), 2);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.matches.matches_settled, 1);
    assert_eq!(snapshot.events.forfeits, 0);
}

#[tokio::test(start_paused = true)]
async fn finishes_landing_on_the_deadline_settle_once() {
    let h = harness(true).await;
    let mut a = h.racer("Nova").await;
    let b = h.racer("Kai").await;
    let formed_at = tokio::time::Instant::now();
    let formed = h.form(&[&a, &b]).await;

    // countdown 3s + text 30s + grace 5s
    tokio::time::sleep_until(formed_at + Duration::from_secs(38)).await;
    formed.handle.send(finish(a.entry.user_id, 30.0)).await;
    formed.handle.send(finish(b.entry.user_id, 30.0)).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(results_in(&mut a.inbox), 1);
    assert_eq!(h.store.results_for_match(&formed.match_id).await.len(), 2);
    assert_eq!(h.metrics.snapshot().matches.matches_settled, 1);
}
