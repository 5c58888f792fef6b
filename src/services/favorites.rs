//! Per-user favorite movies.

use std::sync::Arc;
use tracing::info;

use crate::models::{Favorite, FavoriteMovie};
use crate::store::{FavoriteStore, StoreError};

pub struct FavoriteService<S> {
    store: Arc<S>,
}

impl<S> Clone for FavoriteService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: FavoriteStore> FavoriteService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn is_favorite(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        self.store.is_favorite(user_id, movie_id).await
    }

    pub async fn add(&self, user_id: &str, movie: &FavoriteMovie) -> Result<Favorite, StoreError> {
        let favorite = self.store.add_favorite(user_id, movie).await?;
        info!("User {} added movie {} to favorites", user_id, movie.movie_id);
        Ok(favorite)
    }

    pub async fn remove(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        let removed = self.store.remove_favorite(user_id, movie_id).await?;
        if removed {
            info!("User {} removed movie {} from favorites", user_id, movie_id);
        }
        Ok(removed)
    }

    /// Newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        self.store.list_favorites(user_id).await
    }

    /// Flips the favorite flag for `movie` and returns the new state.
    pub async fn toggle(&self, user_id: &str, movie: &FavoriteMovie) -> Result<bool, StoreError> {
        if self.remove(user_id, movie.movie_id).await? {
            return Ok(false);
        }
        self.add(user_id, movie).await?;
        Ok(true)
    }
}
