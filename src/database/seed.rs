//! JSON seed documents for the in-memory store.
//!
//! ```json
//! {
//!   "users": [{"id": "…", "name": "Admin", "role": "ADMIN"}],
//!   "texts": [{"title": "Easy Warmup 1", "difficulty": "EASY", "timeLimit": 60,
//!              "text": "…", "createdBy": "…"}]
//! }
//! ```

use super::{InMemoryRaceStore, RaceText, UserProfile, UserRole};
use crate::protocol::{Difficulty, Tier, UserId};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDocument {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub texts: Vec<SeedText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub tournament_points: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedText {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    pub difficulty: Difficulty,
    pub text: String,
    pub time_limit: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_by: UserId,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub texts: usize,
}

pub fn load_seed_file(path: &Path) -> Result<SeedDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
}

/// Insert every user and text from the document. Texts must name a seeded author
/// and carry a positive time limit.
pub async fn apply_seed(store: &InMemoryRaceStore, document: SeedDocument) -> Result<SeedSummary> {
    let known_users: HashSet<UserId> = document.users.iter().map(|u| u.id).collect();

    for text in &document.texts {
        if !known_users.contains(&text.created_by) {
            anyhow::bail!(
                "seed text '{}' references unknown author {}",
                text.title,
                text.created_by
            );
        }
        if text.time_limit == 0 {
            anyhow::bail!("seed text '{}' must have a positive timeLimit", text.title);
        }
    }

    let summary = SeedSummary {
        users: document.users.len(),
        texts: document.texts.len(),
    };

    for user in document.users {
        let mut profile = UserProfile::new(user.id, user.name, user.role);
        profile.tournament_points = user.tournament_points.max(0);
        profile.tier = Tier::from_points(profile.tournament_points);
        store.insert_user(profile).await;
    }

    for text in document.texts {
        store
            .insert_race_text(RaceText {
                id: text.id.unwrap_or_else(Uuid::new_v4),
                title: text.title,
                difficulty: text.difficulty,
                text: text.text,
                time_limit: text.time_limit,
                is_active: text.is_active,
                created_by: text.created_by,
            })
            .await;
    }

    Ok(summary)
}
