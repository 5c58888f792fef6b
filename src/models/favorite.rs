use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Movie fields a user pins to their favorites. Kept with the favorite so the
/// list renders without asking the metadata service again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteMovie {
    pub movie_id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_path: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Favorite {
    pub user_id: UserId,
    pub movie_id: i64,
    pub title: String,
    pub poster_path: String,
    pub rating: f64,
    pub release_date: String,
    pub overview: String,
    /// Store-assigned; re-adding a favorite refreshes it.
    pub added_at: DateTime<Utc>,
}

impl Favorite {
    pub fn new(user_id: impl Into<UserId>, movie: FavoriteMovie, added_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            movie_id: movie.movie_id,
            title: movie.title,
            poster_path: movie.poster_path,
            rating: movie.rating,
            release_date: movie.release_date,
            overview: movie.overview,
            added_at,
        }
    }
}
