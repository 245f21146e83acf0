//! Represents a registered account.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A registered user.
///
/// The password digest is never loaded into this struct; it is read on demand
/// through `Database::get_user_hash` when credentials are checked.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct User {
    /// Row identifier, also the value carried by the session cookie.
    pub id: i64,

    /// Unix timestamp (seconds) of registration.
    pub created: i64,

    /// Contact address. Unique across users.
    pub email: String,

    /// Public handle. Unique across users and doubles as the bucket name.
    pub username: String,
}

impl User {
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created, 0).unwrap_or_default()
    }
}
