use thiserror::Error;

/// Reasons a connection is refused at the handshake.
///
/// Every variant maps to HTTP 401; the distinction only reaches the logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,
    #[error("Malformed token")]
    MalformedToken,
    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token is not an access token")]
    WrongTokenType,
    #[error("Token subject is not a user id")]
    InvalidSubject,
    #[error("Unknown user")]
    UnknownUser,
    #[error("Identity lookup failed")]
    Lookup(#[source] anyhow::Error),
}

impl From<base64::DecodeError> for AuthError {
    fn from(_: base64::DecodeError) -> Self {
        Self::MalformedToken
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(_: serde_json::Error) -> Self {
        Self::MalformedToken
    }
}
