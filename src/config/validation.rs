//! Configuration validation functions.

use super::Config;
use std::path::Path;

const MIN_RECOMMENDED_SECRET_LEN: usize = 32;

/// Validate the loaded configuration, failing on settings the server cannot run with.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let secret = config.security.jwt_access_secret.trim();
    if secret.is_empty() {
        anyhow::bail!(
            "\nCRITICAL: No access-token secret is configured!\n\
             ===================================================================\n\
             Every WebSocket handshake is verified against an HS256 secret.\n\
             Configure the same secret your identity service signs with:\n\
             export TYPING_ARENA__SECURITY__JWT_ACCESS_SECRET=\"$(openssl rand -hex 32)\"\n\
             ===================================================================\n"
        );
    }
    if secret.len() < MIN_RECOMMENDED_SECRET_LEN && is_production_mode() {
        eprintln!(
            "\nWARNING: Access-token secret is very short ({} chars).\n\
             Recommended: At least {MIN_RECOMMENDED_SECRET_LEN} characters.\n",
            secret.len()
        );
    }

    if config.security.max_connections_per_ip == 0 {
        anyhow::bail!("security.max_connections_per_ip must be at least 1");
    }
    if config.security.max_message_size < 256 {
        anyhow::bail!(
            "security.max_message_size must be at least 256 bytes (configured: {})",
            config.security.max_message_size
        );
    }

    if let Some(seed_path) = config
        .storage
        .seed_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if !Path::new(seed_path).exists() {
            anyhow::bail!("storage.seed_path points to a missing file: {seed_path}");
        }
    }

    config.matchmaking.validate()?;
    config.websocket.validate()?;

    Ok(())
}

/// Detect if we're running in production mode.
///
/// Checks `TYPING_ARENA__ENVIRONMENT` first, then the generic `PRODUCTION` / `PROD` variables.
pub fn is_production_mode() -> bool {
    use std::env;

    if let Ok(mode) = env::var("TYPING_ARENA__ENVIRONMENT") {
        let mode = mode.to_lowercase();
        return mode == "production" || mode == "prod";
    }

    env::var("PRODUCTION").is_ok() || env::var("PROD").is_ok()
}
