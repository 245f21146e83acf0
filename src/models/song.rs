//! Represents an uploaded audio file.

use serde::Serialize;
use sqlx::FromRow;

/// A song row.
///
/// The audio payload itself lives in the owner's bucket under `filename`.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Song {
    /// Row identifier.
    pub id: i64,

    /// Display title. Unique per owner; song pages are addressed by it.
    pub title: String,

    /// Free-form description, possibly empty.
    pub description: String,

    /// Unix timestamp (seconds) of upload.
    pub created: i64,

    /// Owning user.
    pub user_id: i64,

    /// Object key inside the owner's bucket.
    pub filename: String,
}

impl Song {
    /// Name offered to browsers when the song is downloaded.
    pub fn download_name(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }
}

/// A song joined with its artist's username, used for listings.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct SongWithArtist {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub song: Song,

    pub artist: String,
}
