//! Client for the movie metadata service (TMDB v3 endpoints).
//!
//! Every call goes through a consecutive-failures circuit breaker so a dead
//! upstream fails fast instead of tying up request handlers.

use failsafe::futures::CircuitBreaker as _;
use failsafe::{backoff, failure_policy, Config as BreakerConfig, StateMachine};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CircuitBreakerConfig, TmdbConfig};
use crate::models::movie::GenreList;
use crate::models::{Genre, MovieDetail, MoviePage};

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("movie {0} not found")]
    NotFound(i64),

    #[error("catalog responded with status {0}")]
    Status(StatusCode),

    #[error("catalog temporarily unavailable")]
    CircuitOpen,
}

#[derive(Clone)]
pub struct MovieClient {
    http: reqwest::Client,
    /// Always ends with '/'.
    base_url: String,
    api_key: String,
    image_base_url: String,
    breaker: Breaker,
}

impl MovieClient {
    pub fn new(tmdb: &TmdbConfig, breaker: &CircuitBreakerConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;

        let mut base = tmdb.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        let policy = failure_policy::consecutive_failures(
            breaker.failure_threshold,
            backoff::constant(Duration::from_secs(breaker.timeout_seconds)),
        );

        Ok(Self {
            http,
            base_url: base,
            api_key: tmdb.api_key.clone(),
            image_base_url: tmdb.image_base_url.trim_end_matches('/').to_string(),
            breaker: BreakerConfig::new().failure_policy(policy).build(),
        })
    }

    /// Full poster URL for a path fragment; empty when the movie has no poster.
    pub fn poster_url(&self, poster_path: &str) -> String {
        if poster_path.is_empty() {
            return String::new();
        }
        format!("{}/{}", self.image_base_url, poster_path.trim_start_matches('/'))
    }

    pub async fn now_playing(&self, page: u32) -> Result<MoviePage, CatalogError> {
        self.get_json("movie/now_playing", &[("page", page.to_string())]).await
    }

    pub async fn upcoming(&self, page: u32) -> Result<MoviePage, CatalogError> {
        self.get_json("movie/upcoming", &[("page", page.to_string())]).await
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<MoviePage, CatalogError> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Ok(MoviePage {
                page,
                results: Vec::new(),
                total_pages: 0,
            });
        }
        self.get_json("search/movie", &[("query", query), ("page", page.to_string())])
            .await
    }

    pub async fn movie_detail(&self, movie_id: i64) -> Result<MovieDetail, CatalogError> {
        match self.get_json(&format!("movie/{}", movie_id), &[]).await {
            Err(CatalogError::Status(StatusCode::NOT_FOUND)) => Err(CatalogError::NotFound(movie_id)),
            other => other,
        }
    }

    pub async fn genres(&self) -> Result<Vec<Genre>, CatalogError> {
        let list: GenreList = self.get_json("genre/movie/list", &[]).await?;
        Ok(list.genres)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self
            .http
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params);

        let call = async move {
            let response = request.send().await?;
            let status = response.status();
            // 4xx is the caller's problem and must not trip the breaker.
            if status.is_server_error() {
                return Err(CatalogError::Status(status));
            }
            Ok(response)
        };

        let response = match self.breaker.call(call).await {
            Ok(response) => response,
            Err(failsafe::Error::Rejected) => {
                warn!("Catalog circuit open, rejecting {}", path);
                return Err(CatalogError::CircuitOpen);
            }
            Err(failsafe::Error::Inner(e)) => return Err(e),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status));
        }
        Ok(response.json::<T>().await?)
    }
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
