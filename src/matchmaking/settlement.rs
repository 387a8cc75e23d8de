//! Ranking, points and persistence for a finished match.

use super::scoring::points_for_place;
use crate::database::{MatchUpdate, NewResult, ParticipantUpdate, RaceStore, SettlementDelta};
use crate::protocol::{Difficulty, MatchId, ParticipantStatus, RaceTextId, RankingEntry, UserId};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::cmp::Ordering;

/// One participant's unranked result, as the session saw it at settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub user_id: UserId,
    pub name: String,
    pub status: ParticipantStatus,
    pub wpm: f64,
    pub accuracy: f64,
    pub progress: f64,
    pub error_count: u32,
    /// Seconds, within `[1, duration]`
    pub time_taken: f64,
    /// Finish time for finishers, drop time for forfeiters
    pub finished_at: Option<DateTime<Utc>>,
}

/// Total order used for placements.
///
/// Finished before timed out before forfeited. Among forfeiters the later
/// drop ranks higher. Ties then break on wpm, accuracy and progress (higher
/// first), time taken (lower first) and finally name, case-insensitively
/// with byte order as the last resort.
pub fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    a.status
        .rank_bucket()
        .cmp(&b.status.rank_bucket())
        .then_with(|| {
            if a.status == ParticipantStatus::Forfeited && b.status == ParticipantStatus::Forfeited
            {
                b.finished_at.cmp(&a.finished_at)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.wpm.total_cmp(&a.wpm))
        .then_with(|| b.accuracy.total_cmp(&a.accuracy))
        .then_with(|| b.progress.total_cmp(&a.progress))
        .then_with(|| a.time_taken.total_cmp(&b.time_taken))
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort standings and assign placements, points and the winner.
///
/// Non-forfeiters consume the score table in rank order; every forfeiter
/// loses `forfeit_penalty`. The winner is the top non-forfeiter, if any.
pub fn rank_standings(mut standings: Vec<Standing>, forfeit_penalty: i64) -> Vec<RankingEntry> {
    standings.sort_by(compare_standings);

    let active_players = standings
        .iter()
        .filter(|s| s.status != ParticipantStatus::Forfeited)
        .count();
    let winner = standings
        .iter()
        .find(|s| s.status != ParticipantStatus::Forfeited)
        .map(|s| s.user_id);

    let mut active_place = 0;
    standings
        .into_iter()
        .enumerate()
        .map(|(index, standing)| {
            let points_earned = if standing.status == ParticipantStatus::Forfeited {
                -forfeit_penalty
            } else {
                active_place += 1;
                points_for_place(active_players, active_place)
            };
            RankingEntry {
                won: winner == Some(standing.user_id),
                placement: u32::try_from(index + 1).unwrap_or(u32::MAX),
                points_earned,
                time_taken: standing.time_taken.round().max(1.0) as u32,
                user_id: standing.user_id,
                name: standing.name,
                status: standing.status,
                wpm: standing.wpm,
                accuracy: standing.accuracy,
                progress: standing.progress,
                error_count: standing.error_count,
                finished_at: standing.finished_at,
            }
        })
        .collect()
}

/// What settlement needs to know about the match besides the rankings.
#[derive(Debug, Clone)]
pub struct SettlementContext {
    pub match_id: MatchId,
    pub text_id: RaceTextId,
    pub difficulty: Difficulty,
    pub text_length: usize,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub write_failures: usize,
}

/// Write a settled match to the store.
///
/// Each write is attempted independently; failures are logged and counted,
/// never rolled back, and never stop the remaining participants.
pub async fn persist_settlement(
    store: &dyn RaceStore,
    context: &SettlementContext,
    rankings: &[RankingEntry],
) -> SettlementReport {
    let mut report = SettlementReport::default();
    let match_id = context.match_id;

    if let Err(err) = store
        .update_match(
            &match_id,
            MatchUpdate {
                ended_at: Some(context.ended_at),
            },
        )
        .await
    {
        report.write_failures += 1;
        tracing::warn!(%match_id, error = %err, "Failed to stamp match end time");
    }

    for entry in rankings {
        let user_id = entry.user_id;

        let participant = ParticipantUpdate {
            placement: entry.placement,
            points_earned: entry.points_earned,
            wpm: entry.wpm,
            accuracy: entry.accuracy,
            progress: entry.progress,
            finished_at: entry.finished_at.unwrap_or(context.ended_at),
        };
        if let Err(err) = store
            .upsert_participant(&match_id, &user_id, participant)
            .await
        {
            report.write_failures += 1;
            tracing::warn!(%match_id, %user_id, error = %err, "Failed to update participant");
        }

        let result = NewResult {
            user_id,
            match_id,
            text_id: context.text_id,
            difficulty: context.difficulty,
            wpm: entry.wpm,
            accuracy: entry.accuracy,
            error_count: entry.error_count,
            time_taken: entry.time_taken.max(1),
            text_length: context.text_length,
            won: entry.won,
        };
        if let Err(err) = store.append_result(result).await {
            report.write_failures += 1;
            tracing::warn!(%match_id, %user_id, error = %err, "Failed to append typing result");
        }

        let delta = SettlementDelta {
            points_delta: entry.points_earned,
            won: entry.won,
        };
        match store.apply_user_settlement(&user_id, delta).await {
            Ok(Some(profile)) => tracing::debug!(
                %match_id,
                %user_id,
                points = profile.tournament_points,
                tier = ?profile.tier,
                "Applied settlement to user"
            ),
            Ok(None) => {
                tracing::warn!(%match_id, %user_id, "Settled user no longer exists");
            }
            Err(err) => {
                report.write_failures += 1;
                tracing::warn!(%match_id, %user_id, error = %err, "Failed to apply user settlement");
            }
        }
    }

    let recomputes = rankings
        .iter()
        .map(|entry| store.recompute_user_aggregates(&entry.user_id));
    for (entry, outcome) in rankings.iter().zip(join_all(recomputes).await) {
        if let Err(err) = outcome {
            report.write_failures += 1;
            tracing::warn!(
                %match_id,
                user_id = %entry.user_id,
                error = %err,
                "Failed to recompute user aggregates"
            );
        }
    }

    report
}
