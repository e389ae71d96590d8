use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::controllers::PageParams;
use crate::error::ApiError;
use crate::middleware::StaffUser;
use crate::models::TheatreHall;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/theatre-halls", get(list_halls).post(create_hall))
        .route(
            "/theatre-halls/{id}",
            get(get_hall).put(update_hall).delete(delete_hall),
        )
}

#[derive(Debug, Serialize)]
pub struct TheatreHallResponse {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: i64,
}

impl From<TheatreHall> for TheatreHallResponse {
    fn from(hall: TheatreHall) -> Self {
        let capacity = hall.capacity();
        TheatreHallResponse {
            id: hall.id,
            name: hall.name,
            rows: hall.rows,
            seats_in_row: hall.seats_in_row,
            capacity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TheatreHallPayload {
    name: String,
    rows: i32,
    seats_in_row: i32,
}

impl TheatreHallPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.rows < 1 {
            return Err(ApiError::BadRequest("rows must be > 0".to_string()));
        }
        if self.seats_in_row < 1 {
            return Err(ApiError::BadRequest("seats_in_row must be > 0".to_string()));
        }
        Ok(())
    }
}

async fn list_halls(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let halls = sqlx::query_as::<_, TheatreHall>(
        "SELECT id, name, rows, seats_in_row FROM theatre_halls ORDER BY id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db.pool)
    .await?;

    let payload: Vec<TheatreHallResponse> =
        halls.into_iter().map(TheatreHallResponse::from).collect();
    Ok(Json(payload))
}

async fn get_hall(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let hall = sqlx::query_as::<_, TheatreHall>(
        "SELECT id, name, rows, seats_in_row FROM theatre_halls WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("theatre hall"))?;

    Ok(Json(TheatreHallResponse::from(hall)))
}

async fn create_hall(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(payload): Json<TheatreHallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let hall = sqlx::query_as::<_, TheatreHall>(
        "INSERT INTO theatre_halls (name, rows, seats_in_row) VALUES ($1, $2, $3)
         RETURNING id, name, rows, seats_in_row",
    )
    .bind(&payload.name)
    .bind(payload.rows)
    .bind(payload.seats_in_row)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(TheatreHallResponse::from(hall))))
}

async fn update_hall(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(payload): Json<TheatreHallPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let hall = sqlx::query_as::<_, TheatreHall>(
        "UPDATE theatre_halls SET name = $1, rows = $2, seats_in_row = $3 WHERE id = $4
         RETURNING id, name, rows, seats_in_row",
    )
    .bind(&payload.name)
    .bind(payload.rows)
    .bind(payload.seats_in_row)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("theatre hall"))?;

    Ok(Json(TheatreHallResponse::from(hall)))
}

async fn delete_hall(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM theatre_halls WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("theatre hall"));
    }
    Ok(StatusCode::NO_CONTENT)
}
