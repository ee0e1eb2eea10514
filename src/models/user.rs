// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Read-only projection of the 'users' table.
/// Only used to decorate leaderboard rows.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub full_name: Option<String>,
}

impl UserIdentity {
    /// Full name when present, otherwise the username.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}
