//! The reservation core: seat validation against hall geometry, the derived
//! available-seats count, and the transactional batch booking engine.
//!
//! The engine's pre-checks produce friendly errors in the common case, but
//! the database unique constraint on `(performance_id, row, seat)` is the
//! actual correctness guarantee under concurrency: two racing batches can
//! both pass the pre-checks, and the constraint decides the winner at commit.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::error::{BookingError, SeatError};
use crate::middleware::AuthUser;
use crate::models::{Reservation, TheatreHall, Ticket};
use crate::AppState;

/// One requested seat claim: book `(row, seat)` at this performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct TicketRequest {
    pub performance_id: i64,
    pub row: i32,
    pub seat: i32,
}

/// A committed reservation together with its tickets, in request order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BookedReservation {
    pub reservation: Reservation,
    pub tickets: Vec<Ticket>,
}

/// Checks a 1-based seat coordinate against the hall grid. Pure; the errors
/// carry the rejected value and the inclusive bound for user-facing messages.
pub fn validate_seat(row: i32, seat: i32, hall: &TheatreHall) -> Result<(), SeatError> {
    if row < 1 || row > hall.rows {
        return Err(SeatError::RowOutOfRange {
            value: row,
            bound: hall.rows,
        });
    }
    if seat < 1 || seat > hall.seats_in_row {
        return Err(SeatError::SeatOutOfRange {
            value: seat,
            bound: hall.seats_in_row,
        });
    }
    Ok(())
}

/// The full pre-commit validation pass, pure over pre-fetched state. Each
/// request is checked in presented order: performance resolution first, then
/// hall geometry, then conflicts against both committed tickets (`occupied`)
/// and earlier requests in the same batch. The first failure wins.
fn plan_reservation(
    requests: &[TicketRequest],
    halls: &HashMap<i64, TheatreHall>,
    occupied: &HashSet<(i64, i32, i32)>,
) -> Result<(), BookingError> {
    if requests.is_empty() {
        return Err(BookingError::EmptyReservation);
    }

    let mut claimed = HashSet::with_capacity(requests.len());
    for req in requests {
        let hall = halls
            .get(&req.performance_id)
            .ok_or(BookingError::PerformanceNotFound(req.performance_id))?;

        validate_seat(req.row, req.seat, hall)?;

        let key = (req.performance_id, req.row, req.seat);
        if occupied.contains(&key) || !claimed.insert(key) {
            return Err(BookingError::SeatAlreadyTaken {
                performance_id: req.performance_id,
                row: req.row,
                seat: req.seat,
            });
        }
    }

    Ok(())
}

/// Remaining free seats for a performance: hall capacity minus committed
/// tickets. Recomputed on every call, never cached; the result is advisory
/// for booking decisions (see module docs).
pub async fn available_seats(pool: &PgPool, performance_id: i64) -> Result<i64, BookingError> {
    let available = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT (h.rows::bigint * h.seats_in_row::bigint) - COUNT(t.id)
        FROM performances p
        JOIN theatre_halls h ON h.id = p.theatre_hall_id
        LEFT JOIN tickets t ON t.performance_id = p.id
        WHERE p.id = $1
        GROUP BY h.rows, h.seats_in_row
        "#,
    )
    .bind(performance_id)
    .fetch_optional(pool)
    .await
    .map_err(BookingError::TransactionFailed)?
    .ok_or(BookingError::PerformanceNotFound(performance_id))?;

    if available < 0 {
        // Capacity can never be exceeded while the unique constraint holds.
        error!(
            performance_id,
            available, "negative seat availability, uniqueness constraint violated upstream"
        );
    }

    Ok(available)
}

async fn hall_for_performance(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    performance_id: i64,
) -> Result<Option<TheatreHall>, sqlx::Error> {
    sqlx::query_as::<_, TheatreHall>(
        r#"
        SELECT h.id, h.name, h.rows, h.seats_in_row
        FROM performances p
        JOIN theatre_halls h ON h.id = p.theatre_hall_id
        WHERE p.id = $1
        "#,
    )
    .bind(performance_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Books the whole batch or nothing. Every request is validated against the
/// performance's hall geometry and against already-committed tickets before
/// anything is written; the reservation row and all tickets then go in as a
/// single transaction. A commit-time unique violation from a racing request
/// rolls everything back and surfaces as `SeatAlreadyTaken`.
pub async fn create_reservation(
    state: &AppState,
    user: &AuthUser,
    requests: &[TicketRequest],
) -> Result<BookedReservation, BookingError> {
    // An empty batch never opens a transaction.
    if requests.is_empty() {
        return Err(BookingError::EmptyReservation);
    }

    let mut tx = state
        .db
        .pool
        .begin()
        .await
        .map_err(BookingError::TransactionFailed)?;

    // Resolve each referenced performance's hall once. Missing performances
    // stay absent from the map; the planning pass reports them in request
    // order, not fetch order.
    let mut halls: HashMap<i64, TheatreHall> = HashMap::new();
    for req in requests {
        if halls.contains_key(&req.performance_id) {
            continue;
        }
        if let Some(hall) = hall_for_performance(&mut tx, req.performance_id)
            .await
            .map_err(BookingError::TransactionFailed)?
        {
            halls.insert(req.performance_id, hall);
        }
    }

    // Committed seat claims for the referenced performances, bounded by hall
    // capacity.
    let performance_ids: Vec<i64> = halls.keys().copied().collect();
    let occupied: HashSet<(i64, i32, i32)> = sqlx::query_as::<_, (i64, i32, i32)>(
        r#"SELECT performance_id, "row", seat FROM tickets WHERE performance_id = ANY($1)"#,
    )
    .bind(&performance_ids)
    .fetch_all(&mut *tx)
    .await
    .map_err(BookingError::TransactionFailed)?
    .into_iter()
    .collect();

    plan_reservation(requests, &halls, &occupied)?;

    let reservation = sqlx::query_as::<_, Reservation>(
        "INSERT INTO reservations (user_id) VALUES ($1) RETURNING id, user_id, created_at",
    )
    .bind(user.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(BookingError::TransactionFailed)?;

    let mut tickets = Vec::with_capacity(requests.len());
    for req in requests {
        let inserted = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets ("row", seat, performance_id, reservation_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, "row", seat, performance_id, reservation_id
            "#,
        )
        .bind(req.row)
        .bind(req.seat)
        .bind(req.performance_id)
        .bind(reservation.id)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(ticket) => tickets.push(ticket),
            // A concurrent batch won the race for this seat between our
            // pre-check and this insert. Roll back so no empty reservation
            // survives.
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                let _ = tx.rollback().await;
                return Err(BookingError::SeatAlreadyTaken {
                    performance_id: req.performance_id,
                    row: req.row,
                    seat: req.seat,
                });
            }
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(BookingError::TransactionFailed(e));
            }
        }
    }

    tx.commit().await.map_err(BookingError::TransactionFailed)?;

    info!(
        reservation_id = reservation.id,
        user_id = user.user_id,
        tickets = tickets.len(),
        "reservation committed"
    );

    // Fire-and-forget confirmation. The booking is already durable; a relay
    // outage must not fail it.
    let notifier = state.notifier.clone();
    let reservation_id = reservation.id;
    let email = user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send_confirmation(reservation_id, &email).await {
            warn!(reservation_id, "confirmation notification failed: {:?}", e);
        }
    });

    Ok(BookedReservation {
        reservation,
        tickets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hall(rows: i32, seats_in_row: i32) -> TheatreHall {
        TheatreHall {
            id: 1,
            name: "Main".to_string(),
            rows,
            seats_in_row,
        }
    }

    fn req(performance_id: i64, row: i32, seat: i32) -> TicketRequest {
        TicketRequest {
            performance_id,
            row,
            seat,
        }
    }

    fn halls_for(entries: &[(i64, i32, i32)]) -> HashMap<i64, TheatreHall> {
        entries
            .iter()
            .map(|&(id, rows, seats_in_row)| {
                (
                    id,
                    TheatreHall {
                        id,
                        name: format!("Hall {}", id),
                        rows,
                        seats_in_row,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn accepts_corner_seats() {
        let h = hall(5, 10);
        assert!(validate_seat(1, 1, &h).is_ok());
        assert!(validate_seat(5, 10, &h).is_ok());
    }

    #[test]
    fn rejects_row_outside_grid() {
        let h = hall(5, 10);
        assert_eq!(
            validate_seat(6, 1, &h),
            Err(SeatError::RowOutOfRange { value: 6, bound: 5 })
        );
        assert_eq!(
            validate_seat(0, 1, &h),
            Err(SeatError::RowOutOfRange { value: 0, bound: 5 })
        );
    }

    #[test]
    fn rejects_seat_outside_grid() {
        let h = hall(5, 10);
        assert_eq!(
            validate_seat(5, 11, &h),
            Err(SeatError::SeatOutOfRange {
                value: 11,
                bound: 10
            })
        );
        assert_eq!(
            validate_seat(1, 0, &h),
            Err(SeatError::SeatOutOfRange { value: 0, bound: 10 })
        );
    }

    #[test]
    fn row_check_runs_before_seat_check() {
        let h = hall(5, 10);
        assert_eq!(
            validate_seat(0, 0, &h),
            Err(SeatError::RowOutOfRange { value: 0, bound: 5 })
        );
    }

    proptest! {
        #[test]
        fn validation_matches_grid_membership(
            rows in 1i32..200,
            seats_in_row in 1i32..200,
            row in -50i32..250,
            seat in -50i32..250,
        ) {
            let h = hall(rows, seats_in_row);
            let inside = (1..=rows).contains(&row) && (1..=seats_in_row).contains(&seat);
            prop_assert_eq!(validate_seat(row, seat, &h).is_ok(), inside);
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        let result = plan_reservation(&[], &HashMap::new(), &HashSet::new());
        assert!(matches!(result, Err(BookingError::EmptyReservation)));
    }

    #[test]
    fn valid_batch_passes() {
        let halls = halls_for(&[(1, 5, 10)]);
        let requests = [req(1, 5, 9), req(1, 5, 10)];
        assert!(plan_reservation(&requests, &halls, &HashSet::new()).is_ok());
    }

    #[test]
    fn unknown_performance_is_reported_even_when_duplicated() {
        // Both requests reference a performance that does not exist; the
        // resolution failure comes first, not the duplicate conflict.
        let requests = [req(99, 6, 1), req(99, 6, 1)];
        let result = plan_reservation(&requests, &HashMap::new(), &HashSet::new());
        assert!(matches!(result, Err(BookingError::PerformanceNotFound(99))));
    }

    #[test]
    fn out_of_range_duplicate_is_invalid_seat_not_conflict() {
        let halls = halls_for(&[(1, 5, 10)]);
        let requests = [req(1, 6, 1), req(1, 6, 1)];
        let result = plan_reservation(&requests, &halls, &HashSet::new());
        assert!(matches!(
            result,
            Err(BookingError::InvalidSeat(SeatError::RowOutOfRange {
                value: 6,
                bound: 5
            }))
        ));
    }

    #[test]
    fn committed_seat_conflicts() {
        // Booking a seat that an earlier reservation already committed fails
        // with the conflict error, regardless of its position in the batch.
        let halls = halls_for(&[(1, 5, 10)]);
        let occupied: HashSet<_> = [(1, 5, 10)].into_iter().collect();
        let requests = [req(1, 1, 1), req(1, 5, 10)];
        let result = plan_reservation(&requests, &halls, &occupied);
        assert!(matches!(
            result,
            Err(BookingError::SeatAlreadyTaken {
                performance_id: 1,
                row: 5,
                seat: 10
            })
        ));
    }

    #[test]
    fn in_batch_duplicate_of_valid_seat_conflicts() {
        let halls = halls_for(&[(1, 5, 10)]);
        let requests = [req(1, 2, 3), req(1, 2, 3)];
        let result = plan_reservation(&requests, &halls, &HashSet::new());
        assert!(matches!(
            result,
            Err(BookingError::SeatAlreadyTaken {
                performance_id: 1,
                row: 2,
                seat: 3
            })
        ));
    }

    #[test]
    fn same_coordinates_at_different_performances_do_not_conflict() {
        let halls = halls_for(&[(1, 5, 10), (2, 5, 10)]);
        let requests = [req(1, 2, 3), req(2, 2, 3)];
        assert!(plan_reservation(&requests, &halls, &HashSet::new()).is_ok());
    }

    #[test]
    fn requests_are_checked_in_presented_order() {
        // The first request's geometry failure is reported even though the
        // second references a missing performance.
        let halls = halls_for(&[(1, 5, 10)]);
        let requests = [req(1, 1, 11), req(99, 1, 1)];
        let result = plan_reservation(&requests, &halls, &HashSet::new());
        assert!(matches!(
            result,
            Err(BookingError::InvalidSeat(SeatError::SeatOutOfRange {
                value: 11,
                bound: 10
            }))
        ));
    }
}
