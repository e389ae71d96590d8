use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A committed booking. Owns its tickets exclusively; deleting a reservation
/// cascades to them. Never persisted without at least one ticket.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One seat claim within a reservation, bound to one performance.
/// `(performance_id, row, seat)` is unique across all tickets.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub performance_id: i64,
    pub reservation_id: i64,
}
