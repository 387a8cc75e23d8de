use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes attached to outbound `error` events.
///
/// The description doubles as the `message` text clients display, so it is
/// phrased for players rather than operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors
    InvalidMessage,
    MessageTooLarge,

    // Formation errors
    NoRaceTextAvailable,
    NotEnoughPlayers,
    MatchCreationFailed,

    // Connection limits
    TooManyConnections,

    // Server errors
    InternalError,
}

impl ErrorCode {
    /// Returns the player-facing description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "Invalid message format",
            Self::MessageTooLarge => "Message exceeds the maximum allowed size",
            Self::NoRaceTextAvailable => "No active admin typing test found for this difficulty",
            Self::NotEnoughPlayers => "Not enough active players to start the match",
            Self::MatchCreationFailed => "Could not create match. Please retry queue.",
            Self::TooManyConnections => "Too many connections from this address",
            Self::InternalError => "An internal server error occurred. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formation_messages_match_client_copy() {
        assert_eq!(
            ErrorCode::NoRaceTextAvailable.description(),
            "No active admin typing test found for this difficulty"
        );
        assert_eq!(
            ErrorCode::NotEnoughPlayers.to_string(),
            "Not enough active players to start the match"
        );
        assert_eq!(
            ErrorCode::MatchCreationFailed.to_string(),
            "Could not create match. Please retry queue."
        );
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NotEnoughPlayers).unwrap();
        assert_eq!(json, "\"NOT_ENOUGH_PLAYERS\"");
    }
}
