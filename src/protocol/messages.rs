use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::error_codes::ErrorCode;
use super::lenient;
use super::types::{Difficulty, DropReason, MatchId, ParticipantStatus, RaceTextId, UserId};

/// Events sent from client to server.
///
/// Numeric fields are parsed leniently: numeric strings are accepted and
/// anything non-numeric reads as zero or absent rather than rejecting the frame.
/// A missing, null or non-object `data` reads as an empty payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    remote = "Self",
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Enter the queue for a difficulty and target player count
    Join {
        #[serde(default, deserialize_with = "lenient::optional_string")]
        difficulty: Option<String>,
        #[serde(default, deserialize_with = "lenient::optional_number")]
        player_limit: Option<f64>,
    },
    /// Leave whatever queue this connection is in
    LeaveQueue {},
    /// Forfeit the current match
    LeaveMatch {
        #[serde(default, deserialize_with = "lenient::optional_uuid")]
        match_id: Option<MatchId>,
    },
    /// Live typing progress
    Progress {
        #[serde(default, deserialize_with = "lenient::optional_uuid")]
        match_id: Option<MatchId>,
        #[serde(default, deserialize_with = "lenient::number")]
        progress: f64,
        #[serde(default, deserialize_with = "lenient::number")]
        wpm: f64,
        #[serde(default, deserialize_with = "lenient::number")]
        accuracy: f64,
    },
    /// Completed the race text
    Finish {
        #[serde(default, deserialize_with = "lenient::optional_uuid")]
        match_id: Option<MatchId>,
        #[serde(default, deserialize_with = "lenient::number")]
        wpm: f64,
        #[serde(default, deserialize_with = "lenient::number")]
        accuracy: f64,
        #[serde(default, deserialize_with = "lenient::number")]
        error_count: f64,
        #[serde(default, deserialize_with = "lenient::optional_number")]
        time_taken: Option<f64>,
    },
    /// Heartbeat
    Ping {},
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut frame = Value::deserialize(deserializer)?;
        if let Value::Object(fields) = &mut frame {
            let payload = fields.entry("data").or_insert(Value::Null);
            if !payload.is_object() {
                *payload = Value::Object(Map::new());
            }
        }
        Self::deserialize(frame).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Self::serialize(self, serializer)
    }
}

/// Sent to a connection after every queue join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdatePayload {
    pub difficulty: Difficulty,
    pub player_limit: u8,
    pub queued_players: usize,
    pub target_players: u8,
    pub queue_position: usize,
}

impl QueueUpdatePayload {
    /// The all-zero update sent after leaving the queue.
    #[must_use]
    pub fn left(difficulty: Difficulty, player_limit: u8) -> Self {
        Self {
            difficulty,
            player_limit,
            queued_players: 0,
            target_players: 0,
            queue_position: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayer {
    pub user_id: UserId,
    pub name: String,
}

/// Broadcast to the match room once a match has been formed.
/// Boxed in ServerMessage to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundPayload {
    pub match_id: MatchId,
    pub text_id: RaceTextId,
    pub text: String,
    pub difficulty: Difficulty,
    /// Race duration in seconds
    pub duration: u32,
    pub player_limit: u8,
    pub requested_player_limit: u8,
    pub countdown_seconds: u64,
    /// Epoch milliseconds at which typing may begin
    pub race_start_at: i64,
    pub players: Vec<MatchPlayer>,
}

/// One racer's row in a `progressUpdate` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub user_id: UserId,
    pub name: String,
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
    pub finished: bool,
    pub dropped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<DropReason>,
}

/// One participant's settled standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: UserId,
    pub name: String,
    pub status: ParticipantStatus,
    pub placement: u32,
    pub points_earned: i64,
    pub won: bool,
    pub wpm: f64,
    pub accuracy: f64,
    pub progress: f64,
    pub error_count: u32,
    /// Seconds, within `[1, duration]`
    pub time_taken: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Final standings for a match.
/// Boxed in ServerMessage to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsPayload {
    pub match_id: MatchId,
    pub difficulty: Difficulty,
    pub duration: u32,
    pub text: String,
    pub player_limit: u8,
    pub rankings: Vec<RankingEntry>,
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    QueueUpdate(QueueUpdatePayload),
    MatchFound(Box<MatchFoundPayload>),
    ProgressUpdate {
        match_id: MatchId,
        players: Vec<PlayerProgress>,
    },
    /// A racer forfeited mid-match
    PlayerStatus {
        match_id: MatchId,
        user_id: UserId,
        status: ParticipantStatus,
        reason: DropReason,
    },
    Results(Box<ResultsPayload>),
    LeftMatch {
        match_id: MatchId,
    },
    Pong,
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

impl ServerMessage {
    #[must_use]
    pub fn error(code: ErrorCode) -> Self {
        Self::Error {
            message: code.description().to_string(),
            error_code: Some(code),
        }
    }

    /// Event name as it appears in the `type` field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QueueUpdate(_) => "queueUpdate",
            Self::MatchFound(_) => "matchFound",
            Self::ProgressUpdate { .. } => "progressUpdate",
            Self::PlayerStatus { .. } => "playerStatus",
            Self::Results(_) => "results",
            Self::LeftMatch { .. } => "leftMatch",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn join_parses_numeric_string_player_limit() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "join",
            "data": {"difficulty": "medium", "playerLimit": "2"}
        }))
        .unwrap();
        match msg {
            ClientMessage::Join {
                difficulty,
                player_limit,
            } => {
                assert_eq!(difficulty.as_deref(), Some("medium"));
                assert_eq!(player_limit, Some(2.0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn payloadless_events_parse_with_or_without_data() {
        for frame in [
            r#"{"type":"leaveQueue"}"#,
            r#"{"type":"leaveQueue","data":{}}"#,
            r#"{"type":"leaveQueue","data":null}"#,
        ] {
            let msg: ClientMessage = serde_json::from_str(frame).unwrap();
            assert!(matches!(msg, ClientMessage::LeaveQueue {}), "{frame}");
        }
        for frame in [
            r#"{"type":"ping"}"#,
            r#"{"type":"ping","data":{}}"#,
            r#"{"type":"ping","data":{"at":1}}"#,
        ] {
            let msg: ClientMessage = serde_json::from_str(frame).unwrap();
            assert!(matches!(msg, ClientMessage::Ping {}), "{frame}");
        }
    }

    #[test]
    fn missing_or_odd_data_defaults_the_payload() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Join {
                difficulty: None,
                player_limit: None
            }
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"leaveMatch"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveMatch { match_id: None }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"progress","data":"fast"}"#).unwrap();
        match msg {
            ClientMessage::Progress {
                match_id,
                progress,
                ..
            } => {
                assert_eq!(match_id, None);
                assert_eq!(progress, 0.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn client_messages_serialize_with_type_and_data() {
        let value = serde_json::to_value(ClientMessage::Ping {}).unwrap();
        assert_eq!(value, json!({"type": "ping", "data": {}}));
        let back: ClientMessage = serde_json::from_value(value).unwrap();
        assert!(matches!(back, ClientMessage::Ping {}));
    }

    #[test]
    fn frames_without_a_type_are_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("[1,2]").is_err());
    }

    #[test]
    fn finish_tolerates_missing_and_garbage_fields() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "finish",
            "data": {"matchId": "nope", "wpm": "61.5", "accuracy": null, "errorCount": "x"}
        }))
        .unwrap();
        match msg {
            ClientMessage::Finish {
                match_id,
                wpm,
                accuracy,
                error_count,
                time_taken,
            } => {
                assert_eq!(match_id, None);
                assert_eq!(wpm, 61.5);
                assert_eq!(accuracy, 0.0);
                assert_eq!(error_count, 0.0);
                assert_eq!(time_taken, None);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport","data":{}}"#).is_err());
    }

    #[test]
    fn server_messages_use_camel_case_wire_names() {
        let match_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let value = serde_json::to_value(ServerMessage::PlayerStatus {
            match_id,
            user_id,
            status: ParticipantStatus::Forfeited,
            reason: DropReason::LeftMatch,
        })
        .unwrap();
        assert_eq!(value["type"], "playerStatus");
        assert_eq!(value["data"]["matchId"], match_id.to_string());
        assert_eq!(value["data"]["status"], "forfeited");
        assert_eq!(value["data"]["reason"], "left_match");
    }

    #[test]
    fn queue_update_payload_shape() {
        let value = serde_json::to_value(ServerMessage::QueueUpdate(QueueUpdatePayload {
            difficulty: Difficulty::Hard,
            player_limit: 2,
            queued_players: 1,
            target_players: 2,
            queue_position: 1,
        }))
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "queueUpdate",
                "data": {
                    "difficulty": "HARD",
                    "playerLimit": 2,
                    "queuedPlayers": 1,
                    "targetPlayers": 2,
                    "queuePosition": 1
                }
            })
        );
    }

    #[test]
    fn error_helper_uses_code_description() {
        let value = serde_json::to_value(ServerMessage::error(ErrorCode::InvalidMessage)).unwrap();
        assert_eq!(value["data"]["message"], "Invalid message format");
        assert_eq!(value["data"]["errorCode"], "INVALID_MESSAGE");
        assert_eq!(ServerMessage::Pong.kind(), "pong");
    }
}
