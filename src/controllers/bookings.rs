use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{BookingRequest, SeatKey};
use crate::services::{BookingResult, PreconditionError};
use crate::store::{StoreError, Subscription};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies/{movie_id}/showtimes/{showtime_id}/seats", get(get_seats))
        .route("/movies/{movie_id}/showtimes/{showtime_id}/seats/live", get(live_seats))
        .route("/movies/{movie_id}/showtimes/{showtime_id}/bookings", post(create_booking))
        .route("/bookings", get(get_user_bookings))
        .route("/bookings/live", get(live_bookings))
}

/* ---------- helpers ---------- */

const MAX_SHOWTIME_ID_LEN: usize = 64;

fn seat_key(movie_id: i64, showtime_id: String) -> Result<SeatKey, (StatusCode, String)> {
    if movie_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "movie_id must be > 0".into()));
    }
    if showtime_id.is_empty() || showtime_id.len() > MAX_SHOWTIME_ID_LEN {
        return Err((StatusCode::BAD_REQUEST, "invalid showtime_id".into()));
    }
    Ok(SeatKey::new(movie_id, showtime_id))
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    tracing::error!("Store error: {:?}", err);
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

fn text_frame(value: serde_json::Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Pushes every update of `subscription` to the socket until either side
/// goes away. A store failure is sent as one error frame, then the socket closes.
async fn forward<T: Serialize>(mut socket: WebSocket, mut subscription: Subscription<T>) {
    loop {
        tokio::select! {
            update = subscription.next_update() => match update {
                Some(Ok(value)) => {
                    if socket.send(text_frame(json!({ "type": "snapshot", "data": value }))).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Live subscription ended: {}", e);
                    let _ = socket
                        .send(text_frame(json!({ "type": "error", "message": e.to_string() })))
                        .await;
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                None => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn reject_socket(mut socket: WebSocket, message: String) {
    let _ = socket.send(text_frame(json!({ "type": "error", "message": message }))).await;
    let _ = socket.send(Message::Close(None)).await;
}

/* ---------- SEATS ---------- */

// GET /api/movies/{movie_id}/showtimes/{showtime_id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    Path((movie_id, showtime_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let key = seat_key(movie_id, showtime_id)?;

    if let Some(snapshot) = state.cache.get_seat_map(&key).await {
        return Ok(([("x-cache", "HIT")], Json(snapshot)));
    }

    state.booking.ensure_seats_exist(&key).await.map_err(store_error)?;
    let snapshot = state.booking.seat_map(&key).await.map_err(store_error)?;
    state
        .cache
        .save_seat_map(&snapshot, state.config.cache.seats_ttl_seconds)
        .await;

    Ok(([("x-cache", "MISS")], Json(snapshot)))
}

// GET /api/movies/{movie_id}/showtimes/{showtime_id}/seats/live (WebSocket)
async fn live_seats(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((movie_id, showtime_id)): Path<(i64, String)>,
) -> Result<Response, (StatusCode, String)> {
    let key = seat_key(movie_id, showtime_id)?;

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(e) = state.booking.ensure_seats_exist(&key).await {
            tracing::error!("Could not seed {} for live view: {:?}", key, e);
            return reject_socket(socket, e.to_string()).await;
        }
        match state.booking.subscribe_seats(&key).await {
            Ok(subscription) => {
                tracing::debug!("Live seat view opened for {}", key);
                forward(socket, subscription).await;
                tracing::debug!("Live seat view closed for {}", key);
            }
            Err(e) => reject_socket(socket, e.to_string()).await,
        }
    }))
}

/* ---------- BOOKINGS ---------- */

// POST /api/movies/{movie_id}/showtimes/{showtime_id}/bookings
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, max = 100, message = "select between 1 and 100 seats"))]
    pub seat_ids: Vec<String>,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub movie_title: String,
}

fn booking_response(result: BookingResult) -> Response {
    match result {
        BookingResult::Success(booking) => (StatusCode::CREATED, Json(booking)).into_response(),
        BookingResult::Conflict { seat_id } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "seat already booked", "seat_id": seat_id })),
        )
            .into_response(),
        BookingResult::Rejected(reason) => {
            let status = match reason {
                PreconditionError::NotSignedIn => StatusCode::UNAUTHORIZED,
                PreconditionError::EmptySelection => StatusCode::BAD_REQUEST,
                PreconditionError::BookingInFlight => StatusCode::TOO_MANY_REQUESTS,
            };
            (status, Json(json!({ "error": reason.to_string() }))).into_response()
        }
        BookingResult::Failure { cause } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "booking failed", "cause": cause })),
        )
            .into_response(),
    }
}

// Replaces the cached map with the post-commit one. The cache only moves
// forward in version, so a slower GET cannot put the old map back.
async fn refresh_cached_seat_map(state: &AppState, key: &SeatKey) {
    match state.booking.seat_map(key).await {
        Ok(snapshot) => {
            state
                .cache
                .save_seat_map(&snapshot, state.config.cache.seats_ttl_seconds)
                .await;
        }
        Err(e) => {
            tracing::warn!("Could not reload seat map {} after booking: {:?}", key, e);
            state.cache.invalidate_seat_map(key).await;
        }
    }
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Path((movie_id, showtime_id)): Path<(i64, String)>,
    user: Option<AuthUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Response {
    let key = match seat_key(movie_id, showtime_id) {
        Ok(key) => key,
        Err(rejection) => return rejection.into_response(),
    };
    if user.is_none() {
        return booking_response(BookingResult::Rejected(PreconditionError::NotSignedIn));
    }
    if req.seat_ids.is_empty() {
        return booking_response(BookingResult::Rejected(PreconditionError::EmptySelection));
    }
    if let Err(e) = req.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
    }

    let request = BookingRequest {
        key,
        user_id: user.map(|u| u.user_id),
        seat_ids: req.seat_ids,
        movie_title: req.movie_title,
    };

    // The checkout runs on its own task so a dropped connection cannot
    // interrupt it between the Redis lock and the store transaction.
    let task = tokio::spawn(async move {
        let user_id = request.user_id.clone().unwrap_or_default();
        let lock_ttl = state.config.cache.booking_lock_seconds;
        let Some(lock) = state.cache.try_begin_booking(&user_id, lock_ttl).await else {
            return BookingResult::Rejected(PreconditionError::BookingInFlight);
        };

        let key = request.key.clone();
        let result = state.booking.book_seats(request).await;
        state.cache.end_booking(lock).await;

        if result.is_success() {
            refresh_cached_seat_map(&state, &key).await;
        }
        result
    });

    match task.await {
        Ok(result) => booking_response(result),
        Err(e) => {
            tracing::error!("Booking task panicked: {:?}", e);
            booking_response(BookingResult::Failure {
                cause: "internal error".into(),
            })
        }
    }
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bookings = state
        .booking
        .list_bookings(&user.user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(bookings))
}

// GET /api/bookings/live (WebSocket)
async fn live_bookings(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        match state.booking.subscribe_bookings(&user.user_id).await {
            Ok(subscription) => forward(socket, subscription).await,
            Err(e) => reject_socket(socket, e.to_string()).await,
        }
    })
}
