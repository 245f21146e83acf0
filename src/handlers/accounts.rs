//! Registration, login, logout and account deletion.

use crate::{
    auth::{CurrentUser, with_cookie},
    errors::AppError,
    services::{
        database::DbError,
        object_store::validate_bucket_name,
        session::{SessionKey, hash_password, verify_password},
    },
    state::AppState,
    views::pages,
};
use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    #[serde(default)]
    pub password: String,
}

pub async fn login_page() -> Html<String> {
    pages::login()
}

pub async fn register_page() -> Html<String> {
    pages::register()
}

/// `POST /guest/login`
///
/// Unknown users and wrong passwords get the same answer.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let user = match state.db.get_user_by_name(&form.username).await {
        Ok(user) => user,
        Err(DbError::NotFound) => {
            debug!(username = %form.username, "login for unknown user");
            return Err(AppError::invalid_credentials());
        }
        Err(err) => return Err(err.into()),
    };

    let stored = state.db.get_user_hash(user.id).await?;
    if !verify_password(&form.password, &stored) {
        debug!(user_id = user.id, "login with wrong password");
        return Err(AppError::invalid_credentials());
    }

    info!(user_id = user.id, "user logged in");
    with_cookie(
        Redirect::to("/").into_response(),
        &state.sessions.set_cookie(user.id),
    )
}

/// `POST /guest/register`
///
/// The username doubles as the user's bucket name, so it must be a valid one.
/// If the bucket cannot be created the new user row is removed again.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    validate_bucket_name(&form.username)?;

    let hash = hash_password(&form.password);
    let user_id = match state.db.add_user(&form.email, &form.username, &hash).await {
        Ok(id) => id,
        Err(DbError::AlreadyExists(_)) => {
            return Err(AppError::conflict("Username or email already taken"));
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = state.store.create_bucket(&form.username).await {
        error!(user_id, bucket = %form.username, error = %err, "bucket creation failed");
        if let Err(cleanup) = state.db.delete_user(user_id).await {
            warn!(user_id, error = %cleanup, "could not remove user after bucket failure");
        }
        return Err(AppError::internal("Could not create storage for this account"));
    }

    info!(user_id, username = %form.username, "registered user");
    with_cookie(
        Redirect::to("/").into_response(),
        &state.sessions.set_cookie(user_id),
    )
}

/// `GET /active/logout`
pub async fn logout(CurrentUser(user): CurrentUser) -> Result<Response, AppError> {
    info!(user_id = user.id, "user logged out");
    with_cookie(Redirect::to("/").into_response(), &SessionKey::clear_cookie())
}

/// `POST /active/delete`
///
/// Requires the password again. Removes the user's rows first, then their
/// bucket; a bucket that cannot be removed is logged and left behind.
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<DeleteAccountForm>,
) -> Result<Response, AppError> {
    let stored = state.db.get_user_hash(user.id).await?;
    if !verify_password(&form.password, &stored) {
        return Err(AppError::invalid_credentials());
    }

    let songs = state.db.delete_user(user.id).await?;
    if let Err(err) = state.store.delete_bucket(&user.username).await {
        warn!(user_id = user.id, bucket = %user.username, error = %err, "could not delete bucket");
    }

    info!(user_id = user.id, songs = songs.len(), "deleted account");
    with_cookie(Redirect::to("/").into_response(), &SessionKey::clear_cookie())
}
