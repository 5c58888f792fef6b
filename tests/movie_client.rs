use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cinema_booking::config::{CircuitBreakerConfig, TmdbConfig};
use cinema_booking::movie_client::{CatalogError, MovieClient};

fn client(server: &MockServer, failure_threshold: u32) -> MovieClient {
    MovieClient::new(
        &TmdbConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            image_base_url: "https://img.example.test/t/p/w500".to_string(),
        },
        &CircuitBreakerConfig {
            failure_threshold,
            timeout_seconds: 60,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn now_playing_parses_page_and_sends_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/now_playing"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 2,
            "total_pages": 9,
            "results": [
                {"id": 348, "title": "Alien", "poster_path": "/alien.jpg", "vote_average": 8.1, "genre_ids": [27, 878]},
                {"id": 1091, "title": "The Thing", "poster_path": null, "vote_average": 8.0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 5);
    let page = client.now_playing(2).await.unwrap();

    assert_eq!(page.page, 2);
    assert_eq!(page.total_pages, 9);
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[0].genre_ids, vec![27, 878]);
    assert_eq!(
        client.poster_url(&page.results[0].poster_path),
        "https://img.example.test/t/p/w500/alien.jpg"
    );
    assert_eq!(client.poster_url(&page.results[1].poster_path), "");
}

#[tokio::test]
async fn missing_movie_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"status_code": 34})))
        .mount(&server)
        .await;

    let result = client(&server, 5).movie_detail(999).await;

    assert!(matches!(result, Err(CatalogError::NotFound(999))));
}

#[tokio::test]
async fn blank_search_does_not_call_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let page = client(&server, 5).search("   ", 1).await.unwrap();

    assert!(page.results.is_empty());
}

#[tokio::test]
async fn genres_are_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/genre/movie/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "genres": [{"id": 27, "name": "Horror"}, {"id": 878, "name": "Science Fiction"}]
        })))
        .mount(&server)
        .await;

    let genres = client(&server, 5).genres().await.unwrap();

    assert_eq!(genres.len(), 2);
    assert_eq!(genres[0].name, "Horror");
}

#[tokio::test]
async fn repeated_server_errors_open_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/upcoming"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server, 2);
    for _ in 0..2 {
        let err = client.upcoming(1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status(status) if status.as_u16() == 503));
    }

    let rejected = client.upcoming(1).await.unwrap_err();
    assert!(matches!(rejected, CatalogError::CircuitOpen));
}

#[tokio::test]
async fn client_errors_do_not_open_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server, 2);
    for _ in 0..3 {
        assert!(matches!(client.movie_detail(1).await, Err(CatalogError::NotFound(1))));
    }
}
