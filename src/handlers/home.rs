use crate::{auth::MaybeUser, errors::AppError, state::AppState, views::pages};
use axum::{extract::State, response::Html};
use chrono::Utc;

/// `GET /` lists the most recent uploads.
pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>, AppError> {
    let recent = state.db.get_recent_songs().await?;
    Ok(pages::index(
        user.as_ref().map(|u| u.username.as_str()),
        &recent,
        Utc::now(),
    ))
}
