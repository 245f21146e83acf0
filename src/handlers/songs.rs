//! Upload, playback, download and deletion of songs, plus comments on them.
//! Audio payloads are streamed to and from the object store without being
//! buffered in memory.

use crate::{
    auth::{CurrentUser, MaybeUser},
    errors::AppError,
    models::{like::LikeTarget, song::Song, user::User},
    services::{database::DbError, object_store::StoreError},
    state::AppState,
    views::{
        pages::{self, LikeState, SongPage},
        path_segment, song_url,
    },
};
use axum::{
    Form,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use std::{collections::HashMap, io};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DeleteSongForm {
    #[serde(default)]
    pub song_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub song_id: i64,
    #[serde(default)]
    pub text: String,
    pub parent_id: Option<i64>,
}

/// Text fields of an upload form.
#[derive(Debug, Default)]
struct UploadFields {
    title: String,
    description: String,
}

/// The object written for an upload, kept so it can be removed if the
/// request fails afterwards.
#[derive(Debug)]
struct StoredUpload {
    key: String,
    file_name: String,
}

pub async fn upload_page(CurrentUser(user): CurrentUser) -> Html<String> {
    pages::upload(&user.username)
}

/// `POST /active/upload`
///
/// Multipart fields: `songTitle`, `songDesc`, `file`. The file is streamed
/// into the user's bucket under `<uuid>/<file name>`; the song row is only
/// written once the object is stored.
pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut stored = None;
    let fields = match receive_upload(&state, &user, multipart, &mut stored).await {
        Ok(fields) => fields,
        Err(err) => {
            if let Some(upload) = &stored {
                discard_object(&state, &user.username, &upload.key).await;
            }
            return Err(err);
        }
    };

    let Some(upload) = stored else {
        return Err(AppError::bad_request("No file uploaded"));
    };

    let title = match fields.title.trim() {
        "" => file_stem(&upload.file_name).to_string(),
        title => title.to_string(),
    };
    if !is_addressable_title(&title) {
        discard_object(&state, &user.username, &upload.key).await;
        return Err(AppError::bad_request("Song title cannot be `.` or `..`"));
    }

    let song_id = match state
        .db
        .add_song(&title, &fields.description, &upload.key, user.id)
        .await
    {
        Ok(id) => id,
        Err(err) => {
            discard_object(&state, &user.username, &upload.key).await;
            return Err(match err {
                DbError::AlreadyExists(_) => {
                    AppError::conflict("You already have a song with this title")
                }
                other => other.into(),
            });
        }
    };

    info!(user_id = user.id, song_id, key = %upload.key, "uploaded song");
    Ok(Redirect::to(&song_url(&user.username, &title)).into_response())
}

/// Walk the multipart body, streaming the `file` part into the store.
async fn receive_upload(
    state: &AppState,
    user: &User,
    mut multipart: Multipart,
    stored: &mut Option<StoredUpload>,
) -> Result<UploadFields, AppError> {
    let mut fields = UploadFields::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "songTitle" => fields.title = field.text().await?,
            "songDesc" => fields.description = field.text().await?,
            "file" => {
                if stored.is_some() {
                    return Err(AppError::bad_request("Only one file per upload"));
                }
                let file_name = field.file_name().map(base_name).unwrap_or_default();
                if file_name.is_empty() {
                    return Err(AppError::bad_request("No file uploaded"));
                }

                let key = format!("{}/{}", Uuid::new_v4(), file_name);
                let stream = field
                    .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)))
                    .boxed();
                let info = state
                    .store
                    .put_object(&user.username, &key, stream)
                    .await
                    .map_err(upload_error)?;
                debug!(key = %info.key, size = info.size_bytes, "received upload");

                *stored = Some(StoredUpload { key, file_name });
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }

    Ok(fields)
}

/// Surface a failure of the request body itself (too large, truncated) with
/// its own status instead of as a storage failure.
fn upload_error(err: StoreError) -> AppError {
    match err {
        StoreError::Io(io_err) => {
            match io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
            {
                Some(body_err) => AppError::new(body_err.status(), body_err.body_text()),
                None => StoreError::Io(io_err).into(),
            }
        }
        other => other.into(),
    }
}

/// Song pages are addressed by title, and browsers collapse `.` and `..`
/// path segments, so those titles could never be reached.
fn is_addressable_title(title: &str) -> bool {
    !matches!(title, "." | "..")
}

async fn discard_object(state: &AppState, bucket: &str, key: &str) {
    if let Err(err) = state.store.delete_object(bucket, key).await {
        warn!(bucket, key, error = %err, "could not remove orphaned object");
    }
}

/// Last path component of a client-supplied file name, with control
/// characters dropped.
fn base_name(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Resolve `/{name}/{*song}` to the artist and song rows.
async fn find_song(state: &AppState, name: &str, title: &str) -> Result<(User, Song), AppError> {
    let artist = state.db.get_user_by_name(name).await.map_err(|err| match err {
        DbError::NotFound => AppError::not_found("No such user"),
        other => other.into(),
    })?;
    let song = state
        .db
        .get_song_by_name_for_user(title, artist.id)
        .await
        .map_err(|err| match err {
            DbError::NotFound => AppError::not_found("No such song"),
            other => other.into(),
        })?;
    Ok((artist, song))
}

async fn like_state(
    state: &AppState,
    viewer: Option<&User>,
    ref_id: i64,
    target: LikeTarget,
) -> Result<LikeState, AppError> {
    let count = state.db.ref_like_count(ref_id, target).await?;
    let liked = match viewer {
        Some(user) => state.db.is_liked(user.id, ref_id, target).await?,
        None => false,
    };
    Ok(LikeState { count, liked })
}

/// `GET /user/{name}/{*song}`
pub async fn song_page(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path((name, title)): Path<(String, String)>,
) -> Result<Html<String>, AppError> {
    let (artist, song) = find_song(&state, &name, &title).await?;

    let likes = like_state(&state, viewer.as_ref(), song.id, LikeTarget::Song).await?;
    let comments = state.db.get_comments_for_song(song.id).await?;
    let mut comment_likes = HashMap::with_capacity(comments.len());
    for entry in &comments {
        let id = entry.comment.id;
        comment_likes.insert(
            id,
            like_state(&state, viewer.as_ref(), id, LikeTarget::Comment).await?,
        );
    }

    Ok(pages::song(SongPage {
        current_user: viewer.as_ref().map(|u| u.username.as_str()),
        artist: &artist.username,
        song: &song,
        likes,
        comments: &comments,
        comment_likes: &comment_likes,
        now: Utc::now(),
    }))
}

/// `GET /download/{name}/{*song}` streams the stored audio.
pub async fn download(
    State(state): State<AppState>,
    Path((name, title)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (artist, song) = find_song(&state, &name, &title).await?;
    let (info, reader) = state.store.get_object(&artist.username, &song.filename).await?;

    let file_name = song.download_name();
    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(audio_content_type(file_name)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

fn audio_content_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/mp4",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// `attachment` disposition with an ASCII fallback name and the exact name
/// percent-encoded in `filename*`.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        path_segment(file_name)
    )
}

/// `POST /active/song/delete`
///
/// Only the owner can delete a song. The stored object is removed after the
/// rows are gone; failing to remove it is logged.
pub async fn delete_song(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<DeleteSongForm>,
) -> Result<Response, AppError> {
    match state.db.delete_song_by_id(user.id, form.song_id).await? {
        Some(song) => {
            if let Err(err) = state.store.delete_object(&user.username, &song.filename).await {
                warn!(song_id = song.id, key = %song.filename, error = %err, "could not delete song object");
            }
            info!(user_id = user.id, song_id = song.id, "deleted song");
        }
        None => debug!(user_id = user.id, song_id = form.song_id, "no such song to delete"),
    }
    Ok(Redirect::to("/active/settings").into_response())
}

/// `POST /active/comment`
///
/// A reply's parent must be a comment on the same song.
pub async fn comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<CommentForm>,
) -> Result<Response, AppError> {
    let text = form.text.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("Comment text is required"));
    }

    let song = state.db.get_song(form.song_id).await.map_err(|err| match err {
        DbError::NotFound => AppError::not_found("No such song"),
        other => other.into(),
    })?;

    if let Some(parent_id) = form.parent_id {
        match state.db.get_comment(parent_id).await {
            Ok(parent) if parent.song_id == song.id => {}
            Ok(_) | Err(DbError::NotFound) => {
                return Err(AppError::bad_request("Reply target is not on this song"));
            }
            Err(err) => return Err(err.into()),
        }
    }

    let comment_id = state
        .db
        .add_comment(text, user.id, form.parent_id, song.id)
        .await?;
    info!(user_id = user.id, song_id = song.id, comment_id, "added comment");

    let artist = state.db.get_user_by_id(song.user_id).await?;
    Ok(Redirect::to(&format!(
        "{}#comment-{}",
        song_url(&artist.username, &song.title),
        comment_id
    ))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_client_paths() {
        assert_eq!(base_name("song.mp3"), "song.mp3");
        assert_eq!(base_name("/home/me/song.mp3"), "song.mp3");
        assert_eq!(base_name(r"C:\Music\song.mp3"), "song.mp3");
        assert_eq!(base_name("bad\u{0}name.ogg"), "badname.ogg");
        assert_eq!(base_name("dir/"), "");
    }

    #[test]
    fn file_stem_keeps_dotfiles() {
        assert_eq!(file_stem("Track1.mp3"), "Track1");
        assert_eq!(file_stem("a.b.flac"), "a.b");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn dot_only_titles_are_unreachable() {
        assert!(!is_addressable_title("."));
        assert!(!is_addressable_title(".."));
        assert!(is_addressable_title("..."));
        assert!(is_addressable_title(".hidden"));
    }

    #[test]
    fn oversized_bodies_keep_their_status() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        assert_eq!(
            upload_error(StoreError::Io(io_err)).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            upload_error(StoreError::InvalidObjectKey).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(audio_content_type("x.MP3"), "audio/mpeg");
        assert_eq!(audio_content_type("x.opus"), "audio/ogg");
        assert_eq!(audio_content_type("x"), "application/octet-stream");
    }

    #[test]
    fn disposition_escapes_quotes_and_unicode() {
        let value = content_disposition("my \"song\" ü.mp3");
        assert_eq!(
            value,
            "attachment; filename=\"my _song_ _.mp3\"; filename*=UTF-8''my%20%22song%22%20%C3%BC.mp3"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
