use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

use crate::cache::catalog::catalog_key;
use crate::models::{Movie, MovieDetail, MoviePage};
use crate::movie_client::{CatalogError, MovieClient};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies/now_playing", get(now_playing))
        .route("/movies/upcoming", get(upcoming))
        .route("/movies/search", get(search_movies))
        .route("/movies/{movie_id}", get(movie_detail))
        .route("/genres", get(genres))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub page: Option<u32>,
}

#[derive(Serialize)]
struct MovieCard<'a> {
    #[serde(flatten)]
    movie: &'a Movie,
    poster_url: String,
}

#[derive(Serialize)]
struct MovieDetailView<'a> {
    #[serde(flatten)]
    detail: &'a MovieDetail,
    poster_url: String,
    backdrop_url: String,
}

/* ---------- helpers ---------- */

fn page_number(page: Option<u32>) -> u32 {
    page.unwrap_or(1).clamp(1, 500)
}

fn page_body(client: &MovieClient, page: &MoviePage) -> serde_json::Value {
    let results: Vec<MovieCard<'_>> = page
        .results
        .iter()
        .map(|movie| MovieCard {
            movie,
            poster_url: client.poster_url(&movie.poster_path),
        })
        .collect();

    json!({
        "page": page.page,
        "total_pages": page.total_pages,
        "results": results,
    })
}

fn json_body(body: String, cache_status: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (HeaderName::from_static("x-cache"), cache_status),
        ],
        body,
    )
        .into_response()
}

fn catalog_error(err: CatalogError) -> Response {
    let status = match &err {
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        CatalogError::Status(_) | CatalogError::Http(_) => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::NOT_FOUND {
        tracing::error!("Catalog request failed: {:?}", err);
    }
    (status, err.to_string()).into_response()
}

/// Serves a catalog response from Redis, or loads, caches and serves it.
async fn cached_json<F, Fut>(state: &AppState, key: String, load: F) -> Response
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value, CatalogError>>,
{
    // 1. Cache hit
    if let Ok(Some(body)) = state.cache.get_cached_catalog(&key).await {
        return json_body(body, "HIT");
    }

    // 2. Cache miss: ask the metadata service
    let value = match load().await {
        Ok(value) => value,
        Err(e) => return catalog_error(e),
    };

    // 3. Store for the next caller
    let body = value.to_string();
    if let Err(e) = state
        .cache
        .cache_catalog_response(&key, &body, state.config.cache.catalog_ttl_seconds)
        .await
    {
        tracing::error!("Failed to cache catalog response {}: {:?}", key, e);
    }
    json_body(body, "MISS")
}

/* ---------- MOVIES ---------- */

// GET /api/movies/now_playing?page=
async fn now_playing(State(state): State<Arc<AppState>>, Query(params): Query<PageQuery>) -> Response {
    let page = page_number(params.page);
    let key = catalog_key("now_playing", &[("p", page.to_string())]);
    cached_json(&state, key, || async {
        let movies = state.movies.now_playing(page).await?;
        Ok(page_body(&state.movies, &movies))
    })
    .await
}

// GET /api/movies/upcoming?page=
async fn upcoming(State(state): State<Arc<AppState>>, Query(params): Query<PageQuery>) -> Response {
    let page = page_number(params.page);
    let key = catalog_key("upcoming", &[("p", page.to_string())]);
    cached_json(&state, key, || async {
        let movies = state.movies.upcoming(page).await?;
        Ok(page_body(&state.movies, &movies))
    })
    .await
}

// GET /api/movies/search?query=&page=
async fn search_movies(State(state): State<Arc<AppState>>, Query(params): Query<SearchQuery>) -> Response {
    let query = params.query.unwrap_or_default().trim().to_lowercase();
    let page = page_number(params.page);
    let key = catalog_key("search", &[("q", query.clone()), ("p", page.to_string())]);
    cached_json(&state, key, || async {
        let movies = state.movies.search(&query, page).await?;
        Ok(page_body(&state.movies, &movies))
    })
    .await
}

// GET /api/movies/{movie_id}
async fn movie_detail(State(state): State<Arc<AppState>>, Path(movie_id): Path<i64>) -> Response {
    if movie_id <= 0 {
        return (StatusCode::BAD_REQUEST, "movie_id must be > 0".to_string()).into_response();
    }
    let key = catalog_key("movie", &[("id", movie_id.to_string())]);
    cached_json(&state, key, || async {
        let detail = state.movies.movie_detail(movie_id).await?;
        let view = MovieDetailView {
            poster_url: state.movies.poster_url(&detail.poster_path),
            backdrop_url: state.movies.poster_url(&detail.backdrop_path),
            detail: &detail,
        };
        Ok(json!(view))
    })
    .await
}

// GET /api/genres
async fn genres(State(state): State<Arc<AppState>>) -> Response {
    cached_json(&state, catalog_key("genres", &[]), || async {
        let genres = state.movies.genres().await?;
        Ok(json!({ "genres": genres }))
    })
    .await
}
