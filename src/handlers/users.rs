use crate::{
    auth::{CurrentUser, MaybeUser},
    errors::AppError,
    models::like::LikeTarget,
    services::database::DbError,
    state::AppState,
    views::pages::{self, LikeState},
};
use axum::{
    extract::{Path, State},
    response::Html,
};
use chrono::Utc;

/// `GET /user/{name}` shows a public profile with the user's uploads.
pub async fn profile(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(name): Path<String>,
) -> Result<Html<String>, AppError> {
    let user = state.db.get_user_by_name(&name).await.map_err(|err| match err {
        DbError::NotFound => AppError::not_found("No such user"),
        other => other.into(),
    })?;
    let uploads = state.db.get_songs_for_user(user.id).await?;

    let count = state.db.ref_like_count(user.id, LikeTarget::User).await?;
    let liked = match &viewer {
        Some(v) => state.db.is_liked(v.id, user.id, LikeTarget::User).await?,
        None => false,
    };

    Ok(pages::profile(
        viewer.as_ref().map(|v| v.username.as_str()),
        &user,
        &uploads,
        LikeState { count, liked },
        Utc::now(),
    ))
}

/// `GET /active/settings`
pub async fn settings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Html<String>, AppError> {
    let uploads = state.db.get_songs_for_user(user.id).await?;
    Ok(pages::settings(&user, &uploads))
}
