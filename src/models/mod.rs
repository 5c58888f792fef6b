pub mod seat;
pub mod booking;
pub mod movie;
pub mod favorite;

pub use seat::{Seat, SeatKey, SeatMapSnapshot};
pub use booking::{Booking, BookingRequest, UserId};
pub use movie::{Genre, Movie, MovieDetail, MoviePage};
pub use favorite::{Favorite, FavoriteMovie};
