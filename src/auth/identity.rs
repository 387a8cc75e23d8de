use super::token::{decode_access_token, ACCESS_TOKEN_TYPE};
use super::AuthError;
use crate::database::RaceStore;
use crate::protocol::UserId;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;

/// Who a connection belongs to, resolved once at the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

/// Pick the credential from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header.
pub fn extract_credential<'a>(query_token: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    query_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
                .filter(|token| !token.is_empty())
        })
}

/// Verifies access tokens and resolves the user behind them.
pub struct IdentityGate {
    secret: Vec<u8>,
    store: Arc<dyn RaceStore>,
}

impl IdentityGate {
    pub fn new(secret: impl Into<Vec<u8>>, store: Arc<dyn RaceStore>) -> Self {
        Self {
            secret: secret.into(),
            store,
        }
    }

    pub async fn authenticate_connection(
        &self,
        credential: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let token = credential.ok_or(AuthError::MissingCredential)?;
        let claims = decode_access_token(token, &self.secret, chrono::Utc::now().timestamp())?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        let user_id: UserId = claims
            .sub
            .trim()
            .parse()
            .map_err(|_| AuthError::InvalidSubject)?;

        let user = self
            .store
            .get_user(&user_id)
            .await
            .map_err(AuthError::Lookup)?
            .ok_or(AuthError::UnknownUser)?;

        Ok(Identity {
            user_id,
            display_name: user.name,
        })
    }
}
