// Protocol module: wire events, identifiers and shared enums

pub mod error_codes;
pub mod lenient;
pub mod messages;
pub mod types;

pub use error_codes::ErrorCode;

pub use types::{
    match_room_id, normalize_player_limit, ConnectionId, Difficulty, DropReason, MatchId,
    ParticipantStatus, RaceTextId, RoomId, Tier, UserId, ALLOWED_PLAYER_LIMITS,
    DEFAULT_PLAYER_LIMIT, MIN_MATCH_PLAYERS,
};

pub use messages::{
    ClientMessage, MatchFoundPayload, MatchPlayer, PlayerProgress, QueueUpdatePayload,
    RankingEntry, ResultsPayload, ServerMessage,
};
