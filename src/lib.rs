//! Tardigradio: an audio sharing site.
//!
//! Users register, upload songs, comment on them and like songs, users and
//! comments. Metadata lives in SQLite; audio lives in per-user buckets on an
//! object store.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod views;
