//! Core data models for Tardigradio.
//!
//! These entities mirror the rows of the `users`, `songs`, `comments` and
//! `likes` tables. They map to the database via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod comment;
pub mod like;
pub mod song;
pub mod user;
