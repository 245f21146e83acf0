//! Represents a comment left on a song.

use serde::Serialize;
use sqlx::FromRow;

/// A comment row.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub created: i64,

    /// Author.
    pub user_id: i64,

    /// Parent comment when this is a reply.
    pub comment_id: Option<i64>,

    /// Song the comment belongs to.
    pub song_id: i64,
}

/// A comment joined with its author's username.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,

    pub author: String,
}
