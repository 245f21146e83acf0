//! Defines every route of the site.
//!
//! ## Structure
//! - **Public pages**
//!   - `GET  /`: recent uploads
//!   - `GET  /user/{name}`: profile
//!   - `GET  /user/{name}/{*song}`: song page
//!   - `GET  /download/{name}/{*song}`: streamed audio
//!
//! - **Guest-only** (`/guest/*`, logged-in users are sent home)
//!   - `GET|POST /guest/login`, `GET|POST /guest/register`
//!
//! - **Logged-in only** (`/active/*`, guests are sent to the login page)
//!   - `GET /active/logout`, `GET|POST /active/upload`, `GET /active/settings`
//!   - `POST /active/delete`, `POST /active/song/delete`, `POST /active/comment`
//!
//! - **Likes** (JSON)
//!   - `POST /like/`, `POST /like/count`, `POST /like/status`
//!
//! The wildcard `*song` lets titles contain slashes.

use crate::{
    auth::{require_guest, require_user},
    handlers::{
        accounts::{delete_account, login, login_page, logout, register, register_page},
        health::{healthz, readyz},
        home::index,
        likes::{count, status, toggle},
        songs::{comment, delete_song, download, song_page, upload, upload_page},
        users::{profile, settings},
    },
    services::rate_limit::rate_limit,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Build the application router.
///
/// Static files are served from `assets_dir` under `/assets`. Upload bodies
/// may be up to `max_upload_bytes`; every other route keeps axum's default
/// limit.
pub fn routes(state: AppState, assets_dir: &Path, max_upload_bytes: usize) -> Router {
    let guest = Router::new()
        .route("/guest/login", get(login_page).post(login))
        .route("/guest/register", get(register_page).post(register))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_guest));

    let active = Router::new()
        .route("/active/logout", get(logout))
        .route(
            "/active/upload",
            get(upload_page)
                .post(upload)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/active/settings", get(settings))
        .route("/active/delete", post(delete_account))
        .route("/active/song/delete", post(delete_song))
        .route("/active/comment", post(comment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(index))
        .route("/user/{name}", get(profile))
        .route("/user/{name}/{*song}", get(song_page))
        .route("/download/{name}/{*song}", get(download))
        .route("/like/", post(toggle))
        .route("/like/count", post(count))
        .route("/like/status", post(status))
        .merge(guest)
        .merge(active)
        .nest_service("/assets", ServeDir::new(assets_dir))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
