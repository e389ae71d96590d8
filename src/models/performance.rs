use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single scheduled showing of a play in a theatre hall. Seat geometry is
/// fixed through the referenced hall and never mutated here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Performance {
    pub id: i64,
    pub play_id: i64,
    pub theatre_hall_id: i64,
    pub show_time: DateTime<Utc>,
}
