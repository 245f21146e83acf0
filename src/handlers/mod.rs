//! HTTP handlers, grouped by the part of the site they serve.

pub mod accounts;
pub mod health;
pub mod home;
pub mod likes;
pub mod songs;
pub mod users;
