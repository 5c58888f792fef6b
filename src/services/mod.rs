pub mod seat_map;
pub mod booking;
pub mod favorites;
pub mod session;

pub use booking::{BookingCoordinator, BookingResult, PreconditionError};
pub use favorites::FavoriteService;
pub use seat_map::{LayoutError, SeatLayout};
pub use session::{BookingSession, SelectionState};
