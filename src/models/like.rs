//! Likes and the kinds of things that can be liked.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// What a like points at. Stored in `likes.ref_type` as lowercase text.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
    User,
    Song,
    Comment,
}

impl LikeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeTarget::User => "user",
            LikeTarget::Song => "song",
            LikeTarget::Comment => "comment",
        }
    }
}

impl fmt::Display for LikeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LikeTarget {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(LikeTarget::User),
            "song" => Ok(LikeTarget::Song),
            "comment" => Ok(LikeTarget::Comment),
            other => Err(format!("unknown like target `{}`", other)),
        }
    }
}
