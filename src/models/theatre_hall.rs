use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Seat geometry of a hall: a `rows x seats_in_row` grid. Seat coordinates
/// are 1-based on both axes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TheatreHall {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl TheatreHall {
    pub fn capacity(&self) -> i64 {
        self.rows as i64 * self.seats_in_row as i64
    }
}
