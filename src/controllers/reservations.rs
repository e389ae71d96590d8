use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::sync::Arc;

use crate::controllers::PageParams;
use crate::error::{ApiError, BookingError};
use crate::middleware::AuthUser;
use crate::services::booking::{self, TicketRequest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/{id}", get(get_reservation))
}

#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    tickets: Vec<TicketRequest>,
}

#[derive(Debug, Serialize)]
struct TicketResponse {
    id: i64,
    row: i32,
    seat: i32,
    performance_id: i64,
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    id: i64,
    created_at: DateTime<Utc>,
    tickets: Vec<TicketResponse>,
}

// POST /api/reservations
//
// The whole batch commits or nothing does; see `services::booking`.
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let booked = booking::create_reservation(&state, &user, &req.tickets).await?;

    let response = ReservationResponse {
        id: booked.reservation.id,
        created_at: booked.reservation.created_at,
        tickets: booked
            .tickets
            .into_iter()
            .map(|t| TicketResponse {
                id: t.id,
                row: t.row,
                seat: t.seat,
                performance_id: t.performance_id,
            })
            .collect(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

// GET /api/reservations
//
// The caller's own reservations, newest first, with their tickets.
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();

    let rows = sqlx::query(
        r#"
        SELECT r.id AS rid, r.created_at, t.id AS tid, t."row", t.seat, t.performance_id
        FROM (
          SELECT id, created_at FROM reservations
          WHERE user_id = $1
          ORDER BY created_at DESC, id DESC
          LIMIT $2 OFFSET $3
        ) r
        JOIN tickets t ON t.reservation_id = r.id
        ORDER BY r.created_at DESC, r.id DESC, t.seat
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db.pool)
    .await?;

    // Group ticket rows under their reservation, preserving SQL order.
    let mut reservations: Vec<ReservationResponse> = Vec::new();
    for row in rows {
        let rid: i64 = row.get("rid");
        let ticket = TicketResponse {
            id: row.get("tid"),
            row: row.get("row"),
            seat: row.get("seat"),
            performance_id: row.get("performance_id"),
        };
        match reservations.last_mut() {
            Some(last) if last.id == rid => last.tickets.push(ticket),
            _ => reservations.push(ReservationResponse {
                id: rid,
                created_at: row.get("created_at"),
                tickets: vec![ticket],
            }),
        }
    }

    Ok(Json(reservations))
}

// GET /api/reservations/{id}
//
// Visible only to its owner; anyone else gets the same 404 as a missing id.
async fn get_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reservation = sqlx::query(
        "SELECT id, created_at FROM reservations WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("reservation"))?;

    let tickets = sqlx::query_as::<_, (i64, i32, i32, i64)>(
        r#"SELECT id, "row", seat, performance_id FROM tickets
           WHERE reservation_id = $1 ORDER BY seat"#,
    )
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(ReservationResponse {
        id: reservation.get("id"),
        created_at: reservation.get("created_at"),
        tickets: tickets
            .into_iter()
            .map(|(id, row, seat, performance_id)| TicketResponse {
                id,
                row,
                seat,
                performance_id,
            })
            .collect(),
    }))
}
