pub mod bookings;
pub mod favorites;
pub mod health;
pub mod movies;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(movies::routes())
        .merge(bookings::routes())
        .merge(favorites::routes())
}
