use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use cinema_booking::models::seat::compare_seat_ids;
use cinema_booking::models::{BookingRequest, SeatKey};
use cinema_booking::services::{BookingCoordinator, BookingResult, SeatLayout};
use cinema_booking::store::MemoryStore;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn key() -> SeatKey {
    SeatKey::new(1, "late")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn layout_ids_are_unique_and_sorted(rows in 1u8..=26, cols in 1u8..=40) {
        let layout = SeatLayout::new(rows, cols).unwrap();
        let ids = layout.seat_ids();

        prop_assert_eq!(ids.len(), layout.capacity());
        prop_assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
        prop_assert!(ids.windows(2).all(|w| compare_seat_ids(&w[0], &w[1]).is_lt()));
    }

    #[test]
    fn seeding_is_idempotent(rows in 1u8..=8, cols in 1u8..=8, views in 1usize..5) {
        let layout = SeatLayout::new(rows, cols).unwrap();
        let store = Arc::new(MemoryStore::new());
        let coordinator = BookingCoordinator::new(Arc::clone(&store), layout);

        runtime().block_on(async {
            for _ in 0..views {
                coordinator.ensure_seats_exist(&key()).await.unwrap();
            }
        });

        prop_assert_eq!(store.seat_count(&key()), layout.capacity());
    }

    // Every booked seat is held by exactly the booking that won it, whatever
    // the interleaving of requests.
    #[test]
    fn seats_are_never_double_booked(
        requests in prop::collection::vec(
            (0usize..4, prop::collection::vec(0usize..16, 1..5)),
            1..20,
        )
    ) {
        let layout = SeatLayout::new(4, 4).unwrap();
        let all_ids = layout.seat_ids();
        let coordinator = BookingCoordinator::new(Arc::new(MemoryStore::new()), layout);

        let (results, snapshot, bookings) = runtime().block_on(async {
            coordinator.ensure_seats_exist(&key()).await.unwrap();
            let mut results = Vec::new();
            for (user, seats) in &requests {
                let request = BookingRequest {
                    key: key(),
                    user_id: Some(format!("u{}", user)),
                    seat_ids: seats.iter().map(|i| all_ids[*i].clone()).collect(),
                    movie_title: "Ran".to_string(),
                };
                results.push(coordinator.book_seats(request).await);
            }
            let snapshot = coordinator.seat_map(&key()).await.unwrap();
            let mut bookings = Vec::new();
            for user in 0..4 {
                bookings.extend(coordinator.list_bookings(&format!("u{}", user)).await.unwrap());
            }
            (results, snapshot, bookings)
        });

        let mut claimed = HashSet::new();
        for booking in &bookings {
            for seat in &booking.seat_ids {
                prop_assert!(claimed.insert(seat.clone()), "seat {} booked twice", seat);
                let stored = snapshot.seat(seat).unwrap();
                prop_assert!(stored.booked);
                prop_assert_eq!(stored.held_by.as_deref(), Some(booking.user_id.as_str()));
            }
        }
        prop_assert_eq!(claimed.len(), snapshot.booked_count());

        let successes = results.iter().filter(|r| matches!(r, BookingResult::Success(_))).count();
        prop_assert_eq!(successes, bookings.len());
        prop_assert!(results.iter().all(|r| matches!(r, BookingResult::Success(_) | BookingResult::Conflict { .. })), "unexpected booking result");
    }
}
