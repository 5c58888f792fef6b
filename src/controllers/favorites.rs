use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::FavoriteMovie;
use crate::store::StoreError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/favorites", get(list_favorites))
        .route(
            "/favorites/{movie_id}",
            get(favorite_status).put(add_favorite).delete(remove_favorite),
        )
}

fn movie_id(movie_id: i64) -> Result<i64, (StatusCode, String)> {
    if movie_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "movie_id must be > 0".into()));
    }
    Ok(movie_id)
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    tracing::error!("Favorites store error: {:?}", err);
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

/* ---------- FAVORITES ---------- */

// GET /api/favorites
async fn list_favorites(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let favorites = state.favorites.list(&user.user_id).await.map_err(store_error)?;
    Ok(Json(favorites))
}

// GET /api/favorites/{movie_id}
async fn favorite_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    user: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = movie_id(id)?;
    let is_favorite = state
        .favorites
        .is_favorite(&user.user_id, id)
        .await
        .map_err(store_error)?;
    Ok(Json(json!({ "movie_id": id, "is_favorite": is_favorite })))
}

// PUT /api/favorites/{movie_id}
#[derive(Debug, Deserialize, Validate)]
pub struct FavoriteBody {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub poster_path: String,
    #[validate(range(min = 0.0, max = 10.0))]
    #[serde(default)]
    pub rating: f64,
    #[validate(length(max = 32))]
    #[serde(default)]
    pub release_date: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub overview: String,
}

impl FavoriteBody {
    fn into_movie(self, movie_id: i64) -> FavoriteMovie {
        FavoriteMovie {
            movie_id,
            title: self.title,
            poster_path: self.poster_path,
            rating: self.rating,
            release_date: self.release_date,
            overview: self.overview,
        }
    }
}

async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    user: AuthUser,
    Json(body): Json<FavoriteBody>,
) -> Result<Response, (StatusCode, String)> {
    let id = movie_id(id)?;
    if let Err(e) = body.validate() {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response());
    }

    let favorite = state
        .favorites
        .add(&user.user_id, &body.into_movie(id))
        .await
        .map_err(store_error)?;
    Ok((StatusCode::OK, Json(favorite)).into_response())
}

// DELETE /api/favorites/{movie_id}
async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    user: AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    let id = movie_id(id)?;
    let removed = state
        .favorites
        .remove(&user.user_id, id)
        .await
        .map_err(store_error)?;
    Ok(if removed { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}
