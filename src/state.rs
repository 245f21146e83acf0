//! Shared application state handed to every handler.

use crate::services::{
    database::Database, object_store::ObjectStore, rate_limit::RateLimiter, session::SessionKey,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub store: Arc<dyn ObjectStore>,
    pub sessions: SessionKey,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        sessions: SessionKey,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            db,
            store,
            sessions,
            limiter: Arc::new(limiter),
        }
    }
}
