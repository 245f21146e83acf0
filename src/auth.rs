//! Session extractors and route guards.
//!
//! A request is authenticated when it carries a correctly signed session
//! cookie naming a user that still exists; otherwise it is a guest.

use crate::{
    errors::AppError, models::user::User, services::database::DbError,
    services::session::SessionKey, state::AppState,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

/// The logged-in user. Rejects guests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The logged-in user, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Resolve the session cookie on `parts` to a user row.
async fn session_user(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let Some(user_id) = state.sessions.user_id_from_headers(&parts.headers) else {
        return Ok(None);
    };
    match state.db.get_user_by_id(user_id).await {
        Ok(user) => Ok(Some(user)),
        Err(DbError::NotFound) => {
            debug!(user_id, "session names a user that no longer exists");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(CurrentUser(user.clone()));
        }
        session_user(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthorized("Invalid session token"))
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(MaybeUser(Some(user.clone())));
        }
        Ok(MaybeUser(session_user(parts, state).await?))
    }
}

/// Guard for `/active/*`: guests are sent to the login page and stale
/// cookies are cleared. The resolved user is stored in request extensions.
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    match session_user(&parts, &state).await {
        Ok(Some(user)) => {
            parts.extensions.insert(user);
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(None) => {
            let mut response = Redirect::to("/guest/login").into_response();
            if state.sessions.user_id_from_headers(&parts.headers).is_some() {
                if let Ok(value) = HeaderValue::from_str(&SessionKey::clear_cookie()) {
                    response.headers_mut().insert(SET_COOKIE, value);
                }
            }
            response
        }
        Err(err) => err.into_response(),
    }
}

/// Guard for `/guest/*`: logged-in users are sent home.
pub async fn require_guest(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    match session_user(&parts, &state).await {
        Ok(Some(_)) => Redirect::to("/").into_response(),
        Ok(None) => next.run(Request::from_parts(parts, body)).await,
        Err(err) => err.into_response(),
    }
}

/// Attach a `Set-Cookie` header to a response.
pub fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|err| AppError::internal(format!("invalid cookie header: {}", err)))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}
