//! Persistence, storage network and session services shared by the handlers.

pub mod database;
pub mod network;
pub mod object_store;
pub mod rate_limit;
pub mod session;
