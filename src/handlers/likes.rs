//! JSON endpoints behind the like buttons.
//!
//! All three take a form body with `ref_id` and `ref_type` (`user`, `song`
//! or `comment`).

use crate::{
    auth::{CurrentUser, MaybeUser},
    errors::AppError,
    models::like::LikeTarget,
    services::database::{DbError, DbResult},
    state::AppState,
};
use axum::{Form, Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct LikeForm {
    #[serde(default)]
    pub ref_id: i64,
    #[serde(default)]
    pub ref_type: String,
}

impl LikeForm {
    fn target(&self) -> Result<LikeTarget, AppError> {
        self.ref_type.parse().map_err(AppError::bad_request)
    }
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub liked: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub liked: bool,
}

/// Check the referenced row exists before it can be liked.
async fn ensure_target_exists(state: &AppState, ref_id: i64, target: LikeTarget) -> DbResult<()> {
    match target {
        LikeTarget::User => state.db.get_user_by_id(ref_id).await.map(|_| ()),
        LikeTarget::Song => state.db.get_song(ref_id).await.map(|_| ()),
        LikeTarget::Comment => state.db.get_comment(ref_id).await.map(|_| ()),
    }
}

/// `POST /like/` flips the caller's like and returns the new state.
pub async fn toggle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<LikeForm>,
) -> Result<Json<ToggleResponse>, AppError> {
    let target = form.target()?;
    ensure_target_exists(&state, form.ref_id, target)
        .await
        .map_err(|err| match err {
            DbError::NotFound => AppError::not_found(format!("No such {}", target)),
            other => other.into(),
        })?;

    let liked = state.db.toggle_like(user.id, form.ref_id, target).await?;
    let count = state.db.ref_like_count(form.ref_id, target).await?;
    debug!(user_id = user.id, ref_id = form.ref_id, %target, liked, "toggled like");

    Ok(Json(ToggleResponse { liked, count }))
}

/// `POST /like/count`
pub async fn count(
    State(state): State<AppState>,
    Form(form): Form<LikeForm>,
) -> Result<Json<CountResponse>, AppError> {
    let target = form.target()?;
    let count = state.db.ref_like_count(form.ref_id, target).await?;
    Ok(Json(CountResponse { count }))
}

/// `POST /like/status` reports whether the caller likes the reference.
/// Guests never do.
pub async fn status(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<LikeForm>,
) -> Result<Json<StatusResponse>, AppError> {
    let target = form.target()?;
    let liked = match user {
        Some(user) => state.db.is_liked(user.id, form.ref_id, target).await?,
        None => false,
    };
    Ok(Json(StatusResponse { liked }))
}
