//! src/services/database.rs
//!
//! Persistence for users, songs, comments and likes on a single
//! SQLite file. Every operation is one parameterized statement or one
//! transaction against the shared pool; SQLite serializes the writers.

use crate::models::{
    comment::{Comment, CommentWithAuthor},
    like::LikeTarget,
    song::{Song, SongWithArtist},
    user::User,
};
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

/// Schema applied on every open. Each statement is idempotent.
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Row cap for the home page listing.
const RECENT_SONGS_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Sqlx(sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) if is_unique_violation(db_err.message()) => {
                DbError::AlreadyExists(db_err.message().to_string())
            }
            other => DbError::Sqlx(other),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Handle to the application database.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    pub pool: Arc<SqlitePool>,
}

impl Database {
    /// Open (or create) the database behind `database_url` and apply the schema.
    ///
    /// Accepts `sqlite://path`, `sqlite:path` and `file:path` forms. The parent
    /// directory of the file is created when missing. Write-ahead logging is
    /// enabled when the filesystem allows it.
    pub async fn open(database_url: &str) -> DbResult<Self> {
        let db_path = database_path(database_url);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created missing directory {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        if let Err(err) = sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
        {
            debug!("could not enable write-ahead logging: {}", err);
        }

        let db = Self {
            pool: Arc::new(pool),
        };
        db.apply_schema().await?;
        Ok(db)
    }

    /// Run every statement of the schema inside one transaction.
    async fn apply_schema(&self) -> DbResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Applying {} schema statements", statements.len());

        let mut tx = self.pool.begin().await?;
        for stmt in statements {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Round-trip to the database for readiness checks.
    pub async fn ping(&self) -> DbResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.pool)
            .await?;
        debug_assert_eq!(one, 1);
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---- users ----

    /// Insert a user and return its id.
    ///
    /// Returns AlreadyExists when the email or username is taken.
    pub async fn add_user(&self, email: &str, username: &str, hash: &[u8]) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (created, email, hash, username) VALUES (?, ?, ?, ?)",
        )
        .bind(Utc::now().timestamp())
        .bind(email)
        .bind(hash)
        .bind(username)
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> DbResult<User> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, created, email, username FROM users WHERE id = ? LIMIT 1",
        )
        .bind(user_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, username: &str) -> DbResult<User> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, created, email, username FROM users WHERE username = ? LIMIT 1",
        )
        .bind(username)
        .fetch_one(&*self.pool)
        .await?;
        Ok(user)
    }

    /// Stored password digest for credential checks.
    pub async fn get_user_hash(&self, user_id: i64) -> DbResult<Vec<u8>> {
        let hash = sqlx::query_scalar::<_, Vec<u8>>("SELECT hash FROM users WHERE id = ? LIMIT 1")
            .bind(user_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(hash)
    }

    /// Delete a user together with everything they authored.
    ///
    /// Removes the user's songs, the comments and likes on those songs, the
    /// user's own comments and likes, and likes pointing at the user. Returns
    /// the deleted songs so the caller can drop their objects. Deleting a
    /// missing user is a no-op.
    pub async fn delete_user(&self, user_id: i64) -> DbResult<Vec<Song>> {
        let mut tx = self.pool.begin().await?;

        let songs = sqlx::query_as::<_, Song>(
            "SELECT id, title, description, created, user_id, filename
             FROM songs WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM likes
             WHERE ref_type = 'comment'
               AND ref_id IN (SELECT id FROM comments
                              WHERE user_id = ?
                                 OR song_id IN (SELECT id FROM songs WHERE user_id = ?))",
        )
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM likes
             WHERE user_id = ?
                OR (ref_type = 'user' AND ref_id = ?)
                OR (ref_type = 'song' AND ref_id IN (SELECT id FROM songs WHERE user_id = ?))",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM comments
             WHERE user_id = ? OR song_id IN (SELECT id FROM songs WHERE user_id = ?)",
        )
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM songs WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(songs)
    }

    // ---- songs ----

    /// Insert a song and return its id.
    ///
    /// Returns AlreadyExists when the owner already has a song with this title.
    pub async fn add_song(
        &self,
        title: &str,
        description: &str,
        filename: &str,
        user_id: i64,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO songs (title, description, created, user_id, filename)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(description)
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(filename)
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_song(&self, song_id: i64) -> DbResult<Song> {
        let song = sqlx::query_as::<_, Song>(
            "SELECT id, title, description, created, user_id, filename
             FROM songs WHERE id = ? LIMIT 1",
        )
        .bind(song_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(song)
    }

    pub async fn get_song_by_name_for_user(&self, title: &str, user_id: i64) -> DbResult<Song> {
        let song = sqlx::query_as::<_, Song>(
            "SELECT id, title, description, created, user_id, filename
             FROM songs WHERE title = ? AND user_id = ? LIMIT 1",
        )
        .bind(title)
        .bind(user_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(song)
    }

    /// All songs owned by `user_id`, newest first.
    pub async fn get_songs_for_user(&self, user_id: i64) -> DbResult<Vec<Song>> {
        let songs = sqlx::query_as::<_, Song>(
            "SELECT id, title, description, created, user_id, filename
             FROM songs WHERE user_id = ?
             ORDER BY created DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(songs)
    }

    /// The most recent uploads across all users, with artist names.
    pub async fn get_recent_songs(&self) -> DbResult<Vec<SongWithArtist>> {
        let songs = sqlx::query_as::<_, SongWithArtist>(
            "SELECT s.id, s.title, s.description, s.created, s.user_id, s.filename,
                    u.username AS artist
             FROM songs s
             JOIN users u ON u.id = s.user_id
             ORDER BY s.created DESC, s.id DESC
             LIMIT ?",
        )
        .bind(RECENT_SONGS_LIMIT)
        .fetch_all(&*self.pool)
        .await?;
        Ok(songs)
    }

    /// Delete a song owned by `user_id` along with its comments and likes.
    ///
    /// Returns the deleted row, or None when no such song belongs to the user.
    pub async fn delete_song_by_id(&self, user_id: i64, song_id: i64) -> DbResult<Option<Song>> {
        let mut tx = self.pool.begin().await?;

        let song = sqlx::query_as::<_, Song>(
            "SELECT id, title, description, created, user_id, filename
             FROM songs WHERE id = ? AND user_id = ?",
        )
        .bind(song_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(song) = song else {
            return Ok(None);
        };

        sqlx::query(
            "DELETE FROM likes
             WHERE (ref_type = 'song' AND ref_id = ?)
                OR (ref_type = 'comment' AND ref_id IN (SELECT id FROM comments WHERE song_id = ?))",
        )
        .bind(song_id)
        .bind(song_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM comments WHERE song_id = ?")
            .bind(song_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(song_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(song))
    }

    // ---- comments ----

    /// Insert a comment and return its id. `parent` threads it under another comment.
    pub async fn add_comment(
        &self,
        text: &str,
        user_id: i64,
        parent: Option<i64>,
        song_id: i64,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO comments (text, created, user_id, comment_id, song_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(text)
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(parent)
        .bind(song_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Comments on a song in posting order, with author names.
    pub async fn get_comments_for_song(&self, song_id: i64) -> DbResult<Vec<CommentWithAuthor>> {
        let comments = sqlx::query_as::<_, CommentWithAuthor>(
            "SELECT c.id, c.text, c.created, c.user_id, c.comment_id, c.song_id,
                    u.username AS author
             FROM comments c
             JOIN users u ON u.id = c.user_id
             WHERE c.song_id = ?
             ORDER BY c.created ASC, c.id ASC",
        )
        .bind(song_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(comments)
    }

    pub async fn get_comment(&self, comment_id: i64) -> DbResult<Comment> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, text, created, user_id, comment_id, song_id
             FROM comments WHERE id = ? LIMIT 1",
        )
        .bind(comment_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(comment)
    }

    // ---- likes ----

    /// Record a like. Liking twice is a no-op; returns whether a row was added.
    pub async fn add_like(&self, user_id: i64, ref_id: i64, target: LikeTarget) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO likes (created, user_id, ref_id, ref_type) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, ref_id, ref_type) DO NOTHING",
        )
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(ref_id)
        .bind(target.as_str())
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a like. Returns whether a row was removed.
    pub async fn remove_like(
        &self,
        user_id: i64,
        ref_id: i64,
        target: LikeTarget,
    ) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM likes WHERE user_id = ? AND ref_id = ? AND ref_type = ?")
                .bind(user_id)
                .bind(ref_id)
                .bind(target.as_str())
                .execute(&*self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip the like state of (`user_id`, `ref_id`, `target`) atomically.
    ///
    /// Returns true when the reference is liked after the call.
    pub async fn toggle_like(
        &self,
        user_id: i64,
        ref_id: i64,
        target: LikeTarget,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let removed =
            sqlx::query("DELETE FROM likes WHERE user_id = ? AND ref_id = ? AND ref_type = ?")
                .bind(user_id)
                .bind(ref_id)
                .bind(target.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO likes (created, user_id, ref_id, ref_type) VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_id, ref_id, ref_type) DO NOTHING",
            )
            .bind(Utc::now().timestamp())
            .bind(user_id)
            .bind(ref_id)
            .bind(target.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(removed == 0)
    }

    pub async fn is_liked(&self, user_id: i64, ref_id: i64, target: LikeTarget) -> DbResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM likes WHERE user_id = ? AND ref_id = ? AND ref_type = ?",
        )
        .bind(user_id)
        .bind(ref_id)
        .bind(target.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(found > 0)
    }

    /// Number of likes a reference has received.
    pub async fn ref_like_count(&self, ref_id: i64, target: LikeTarget) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM likes WHERE ref_id = ? AND ref_type = ?",
        )
        .bind(ref_id)
        .bind(target.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }
}

/// Extract the filesystem path from a SQLite URL.
fn database_path(database_url: &str) -> &str {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    path.split('?').next().unwrap_or(path)
}

/// Return true if a database error message indicates a unique constraint violation.
fn is_unique_violation(message: &str) -> bool {
    message.to_ascii_lowercase().contains("unique")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.sqlite").display());
        let db = Database::open(&url).await.expect("open database");
        (db, dir)
    }

    #[test]
    fn database_path_strips_scheme_and_query() {
        assert_eq!(database_path("sqlite://./data/db.sqlite"), "./data/db.sqlite");
        assert_eq!(database_path("sqlite:/tmp/x.db?mode=rwc"), "/tmp/x.db");
        assert_eq!(database_path("file:db.sqlite"), "db.sqlite");
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let (db, _dir) = test_db().await;
        db.apply_schema().await.expect("second apply");
        db.apply_schema().await.expect("third apply");
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/db.sqlite").display());
        let db = Database::open(&url).await.unwrap();
        let id = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        db.close().await;

        let db = Database::open(&url).await.unwrap();
        assert_eq!(db.get_user_by_id(id).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn add_and_fetch_user() {
        let (db, _dir) = test_db().await;
        let id = db.add_user("a@x.com", "alice", b"digest").await.unwrap();

        let by_id = db.get_user_by_id(id).await.unwrap();
        let by_name = db.get_user_by_name("alice").await.unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.email, "a@x.com");
        assert_eq!(db.get_user_hash(id).await.unwrap(), b"digest".to_vec());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let (db, _dir) = test_db().await;
        db.add_user("a@x.com", "alice", b"h").await.unwrap();

        let dup_name = db.add_user("other@x.com", "alice", b"h").await;
        assert!(matches!(dup_name, Err(DbError::AlreadyExists(_))));

        let dup_email = db.add_user("a@x.com", "alice2", b"h").await;
        assert!(matches!(dup_email, Err(DbError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn ids_of_deleted_rows_are_never_reused() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let song = db.add_song("Track1", "", "k/t.mp3", alice).await.unwrap();
        let comment = db.add_comment("hi", alice, None, song).await.unwrap();
        db.delete_user(alice).await.unwrap();

        let bob = db.add_user("b@x.com", "bobby", b"h").await.unwrap();
        let bob_song = db.add_song("Track1", "", "k/t.mp3", bob).await.unwrap();
        let bob_comment = db.add_comment("hi", bob, None, bob_song).await.unwrap();
        assert!(bob > alice);
        assert!(bob_song > song);
        assert!(bob_comment > comment);
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let (db, _dir) = test_db().await;
        assert!(matches!(db.get_user_by_id(42).await, Err(DbError::NotFound)));
        assert!(matches!(
            db.get_user_by_name("nobody").await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn songs_are_listed_per_user_and_recently() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();

        db.add_song("Track1", "first", "k1/track1.mp3", alice).await.unwrap();
        db.add_song("Track2", "", "k2/track2.mp3", alice).await.unwrap();
        db.add_song("Other", "", "k3/other.ogg", bob).await.unwrap();

        let mine = db.get_songs_for_user(alice).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|s| s.user_id == alice));

        let recent = db.get_recent_songs().await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].song.title, "Other");
        assert_eq!(recent[0].artist, "bob");

        let found = db.get_song_by_name_for_user("Track1", alice).await.unwrap();
        assert_eq!(found.filename, "k1/track1.mp3");
        assert!(matches!(
            db.get_song_by_name_for_user("Track1", bob).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn song_titles_are_unique_per_user() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();

        db.add_song("Track1", "", "a", alice).await.unwrap();
        assert!(matches!(
            db.add_song("Track1", "", "b", alice).await,
            Err(DbError::AlreadyExists(_))
        ));
        db.add_song("Track1", "", "c", bob).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_song_removes_its_comments_and_likes() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();

        let doomed = db.add_song("Doomed", "", "k/d.mp3", alice).await.unwrap();
        let kept = db.add_song("Kept", "", "k/k.mp3", alice).await.unwrap();

        let top = db.add_comment("nice", bob, None, doomed).await.unwrap();
        db.add_comment("agreed", alice, Some(top), doomed).await.unwrap();
        let survivor = db.add_comment("also nice", bob, None, kept).await.unwrap();
        db.add_like(bob, doomed, LikeTarget::Song).await.unwrap();
        db.add_like(alice, top, LikeTarget::Comment).await.unwrap();

        let deleted = db.delete_song_by_id(alice, doomed).await.unwrap();
        assert_eq!(deleted.map(|s| s.id), Some(doomed));

        let orphans = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE song_id = ?")
            .bind(doomed)
            .fetch_one(&*db.pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(db.ref_like_count(doomed, LikeTarget::Song).await.unwrap(), 0);
        assert_eq!(db.ref_like_count(top, LikeTarget::Comment).await.unwrap(), 0);

        assert_eq!(db.get_comment(survivor).await.unwrap().song_id, kept);
        assert!(matches!(db.get_song(doomed).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_someone_elses_song_is_a_noop() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();
        let song = db.add_song("Mine", "", "k/m.mp3", alice).await.unwrap();

        assert!(db.delete_song_by_id(bob, song).await.unwrap().is_none());
        assert!(db.delete_song_by_id(alice, 9999).await.unwrap().is_none());
        assert_eq!(db.get_song(song).await.unwrap().title, "Mine");
    }

    #[tokio::test]
    async fn comments_keep_their_thread_parent() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let song = db.add_song("S", "", "k/s.mp3", alice).await.unwrap();

        let root = db.add_comment("root", alice, None, song).await.unwrap();
        let reply = db.add_comment("reply", alice, Some(root), song).await.unwrap();

        let comments = db.get_comments_for_song(song).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].comment.id, root);
        assert_eq!(comments[0].comment.comment_id, None);
        assert_eq!(comments[1].comment.id, reply);
        assert_eq!(comments[1].comment.comment_id, Some(root));
        assert_eq!(comments[1].author, "alice");
    }

    #[tokio::test]
    async fn toggling_a_like_twice_restores_the_count() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();
        let song = db.add_song("S", "", "k/s.mp3", alice).await.unwrap();
        db.add_like(bob, song, LikeTarget::Song).await.unwrap();

        let before = db.ref_like_count(song, LikeTarget::Song).await.unwrap();

        assert!(db.toggle_like(alice, song, LikeTarget::Song).await.unwrap());
        assert!(db.is_liked(alice, song, LikeTarget::Song).await.unwrap());
        assert_eq!(db.ref_like_count(song, LikeTarget::Song).await.unwrap(), before + 1);

        assert!(!db.toggle_like(alice, song, LikeTarget::Song).await.unwrap());
        assert!(!db.is_liked(alice, song, LikeTarget::Song).await.unwrap());
        assert_eq!(db.ref_like_count(song, LikeTarget::Song).await.unwrap(), before);
    }

    #[tokio::test]
    async fn likes_are_unique_per_user_and_reference() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();

        assert!(db.add_like(alice, 7, LikeTarget::Song).await.unwrap());
        assert!(!db.add_like(alice, 7, LikeTarget::Song).await.unwrap());
        assert!(db.add_like(alice, 7, LikeTarget::Comment).await.unwrap());
        assert_eq!(db.ref_like_count(7, LikeTarget::Song).await.unwrap(), 1);

        assert!(db.remove_like(alice, 7, LikeTarget::Song).await.unwrap());
        assert!(!db.remove_like(alice, 7, LikeTarget::Song).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let (db, _dir) = test_db().await;
        let alice = db.add_user("a@x.com", "alice", b"h").await.unwrap();
        let bob = db.add_user("b@x.com", "bob", b"h").await.unwrap();

        let alice_song = db.add_song("A", "", "k/a.mp3", alice).await.unwrap();
        let bob_song = db.add_song("B", "", "k/b.mp3", bob).await.unwrap();
        db.add_comment("on bob", alice, None, bob_song).await.unwrap();
        db.add_comment("on alice", bob, None, alice_song).await.unwrap();
        db.add_like(alice, bob_song, LikeTarget::Song).await.unwrap();
        db.add_like(bob, alice, LikeTarget::User).await.unwrap();

        let removed = db.delete_user(alice).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, alice_song);

        assert!(matches!(db.get_user_by_id(alice).await, Err(DbError::NotFound)));
        assert!(db.get_comments_for_song(bob_song).await.unwrap().is_empty());
        assert_eq!(db.ref_like_count(bob_song, LikeTarget::Song).await.unwrap(), 0);
        assert_eq!(db.ref_like_count(alice, LikeTarget::User).await.unwrap(), 0);
        assert_eq!(db.get_songs_for_user(bob).await.unwrap().len(), 1);

        assert!(db.delete_user(alice).await.unwrap().is_empty());
    }
}
