use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use std::sync::Arc;

use crate::controllers::theatre_halls::TheatreHallResponse;
use crate::controllers::PageParams;
use crate::error::{ApiError, BookingError};
use crate::middleware::{AuthUser, StaffUser};
use crate::models::{Performance, Play, TheatreHall};
use crate::services::booking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/performances", get(list_performances).post(create_performance))
        .route(
            "/performances/{id}",
            get(get_performance)
                .put(update_performance)
                .delete(delete_performance),
        )
        .route(
            "/performances/{id}/available-seats",
            get(get_available_seats),
        )
}

#[derive(Debug, Deserialize)]
struct PerformancesQuery {
    #[serde(rename = "playTitle")]
    play_title: Option<String>,
    #[serde(rename = "theatreHall")]
    theatre_hall: Option<i64>,
    #[serde(rename = "showTimeMin")]
    show_time_min: Option<DateTime<Utc>>,
    #[serde(rename = "showTimeMax")]
    show_time_max: Option<DateTime<Utc>>,
    ordering: Option<String>,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
}

/// List projection: one row per performance with its hall capacity and the
/// derived free-seat count.
#[derive(Debug, FromRow, Serialize)]
struct PerformanceListItem {
    id: i64,
    play_title: String,
    play_image: Option<String>,
    show_time: DateTime<Utc>,
    theatre_hall_name: String,
    theatre_hall_capacity: i64,
    tickets_available: i64,
}

#[derive(Debug, FromRow, Serialize)]
struct TakenPlace {
    row: i32,
    seat: i32,
}

/// Detail projection: full play and hall records plus the occupied seats.
#[derive(Debug, Serialize)]
struct PerformanceDetailResponse {
    id: i64,
    show_time: DateTime<Utc>,
    play: Play,
    theatre_hall: TheatreHallResponse,
    taken_places: Vec<TakenPlace>,
}

#[derive(Debug, Deserialize)]
struct PerformancePayload {
    play: i64,
    theatre_hall: i64,
    show_time: DateTime<Utc>,
}

fn map_unknown_reference(e: sqlx::Error) -> ApiError {
    if e.as_database_error()
        .is_some_and(|d| d.is_foreign_key_violation())
    {
        ApiError::BadRequest("unknown play or theatre hall id".to_string())
    } else {
        ApiError::Database(e)
    }
}

// Ordering is a fixed whitelist; anything else is rejected rather than
// spliced into SQL.
fn order_clause(ordering: Option<&str>) -> Result<&'static str, ApiError> {
    match ordering.unwrap_or("show_time") {
        "show_time" => Ok("p.show_time, p.id"),
        "-show_time" => Ok("p.show_time DESC, p.id"),
        "play_title" => Ok("pl.title, p.id"),
        "-play_title" => Ok("pl.title DESC, p.id"),
        "theatre_hall_name" => Ok("h.name, p.id"),
        "-theatre_hall_name" => Ok("h.name DESC, p.id"),
        "tickets_available" => Ok("tickets_available, p.id"),
        "-tickets_available" => Ok("tickets_available DESC, p.id"),
        other => Err(ApiError::BadRequest(format!(
            "unsupported ordering: {}",
            other
        ))),
    }
}

// GET /api/performances
//
// Non-staff callers only see upcoming performances.
async fn list_performances(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(params): Query<PerformancesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = PageParams {
        page: params.page,
        page_size: params.page_size,
    }
    .limit_offset();
    let order = order_clause(params.ordering.as_deref())?;

    let mut q = String::from(
        r#"
        SELECT p.id, pl.title AS play_title, pl.image AS play_image, p.show_time,
               h.name AS theatre_hall_name,
               (h.rows::bigint * h.seats_in_row::bigint) AS theatre_hall_capacity,
               (h.rows::bigint * h.seats_in_row::bigint) - COUNT(t.id) AS tickets_available
        FROM performances p
        JOIN plays pl ON pl.id = p.play_id
        JOIN theatre_halls h ON h.id = p.theatre_hall_id
        LEFT JOIN tickets t ON t.performance_id = p.id
        WHERE TRUE
        "#,
    );
    let mut bind_idx = 1;

    if params.play_title.is_some() {
        q.push_str(&format!(" AND pl.title ILIKE ${}", bind_idx));
        bind_idx += 1;
    }
    if params.theatre_hall.is_some() {
        q.push_str(&format!(" AND p.theatre_hall_id = ${}", bind_idx));
        bind_idx += 1;
    }
    if params.show_time_min.is_some() {
        q.push_str(&format!(" AND p.show_time >= ${}", bind_idx));
        bind_idx += 1;
    }
    if params.show_time_max.is_some() {
        q.push_str(&format!(" AND p.show_time <= ${}", bind_idx));
        bind_idx += 1;
    }
    if !user.as_ref().is_some_and(|u| u.is_staff) {
        q.push_str(" AND p.show_time >= NOW()");
    }

    q.push_str(
        " GROUP BY p.id, pl.title, pl.image, p.show_time, h.name, h.rows, h.seats_in_row",
    );
    q.push_str(&format!(
        " ORDER BY {} LIMIT ${} OFFSET ${}",
        order,
        bind_idx,
        bind_idx + 1
    ));

    let mut dbq = sqlx::query_as::<_, PerformanceListItem>(&q);
    if let Some(ref title) = params.play_title {
        dbq = dbq.bind(format!("%{}%", title));
    }
    if let Some(hall) = params.theatre_hall {
        dbq = dbq.bind(hall);
    }
    if let Some(min) = params.show_time_min {
        dbq = dbq.bind(min);
    }
    if let Some(max) = params.show_time_max {
        dbq = dbq.bind(max);
    }

    let items = dbq
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(items))
}

// GET /api/performances/{id}
async fn get_performance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let performance = sqlx::query_as::<_, Performance>(
        "SELECT id, play_id, theatre_hall_id, show_time FROM performances WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("performance"))?;

    let play = sqlx::query_as::<_, Play>(
        "SELECT id, title, description, duration, image FROM plays WHERE id = $1",
    )
    .bind(performance.play_id)
    .fetch_one(&state.db.pool)
    .await?;

    let hall = sqlx::query_as::<_, TheatreHall>(
        "SELECT id, name, rows, seats_in_row FROM theatre_halls WHERE id = $1",
    )
    .bind(performance.theatre_hall_id)
    .fetch_one(&state.db.pool)
    .await?;

    let taken_places = sqlx::query_as::<_, TakenPlace>(
        r#"SELECT "row", seat FROM tickets WHERE performance_id = $1 ORDER BY "row", seat"#,
    )
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(PerformanceDetailResponse {
        id: performance.id,
        show_time: performance.show_time,
        play,
        theatre_hall: TheatreHallResponse::from(hall),
        taken_places,
    }))
}

// GET /api/performances/{id}/available-seats
async fn get_available_seats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let available = booking::available_seats(&state.db.pool, id).await?;
    Ok(Json(json!({ "performance_id": id, "available": available })))
}

// POST /api/performances
async fn create_performance(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(payload): Json<PerformancePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let performance = sqlx::query_as::<_, Performance>(
        "INSERT INTO performances (play_id, theatre_hall_id, show_time) VALUES ($1, $2, $3)
         RETURNING id, play_id, theatre_hall_id, show_time",
    )
    .bind(payload.play)
    .bind(payload.theatre_hall)
    .bind(payload.show_time)
    .fetch_one(&state.db.pool)
    .await
    .map_err(map_unknown_reference)?;

    Ok((StatusCode::CREATED, Json(performance)))
}

// PUT /api/performances/{id}
async fn update_performance(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(payload): Json<PerformancePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let performance = sqlx::query_as::<_, Performance>(
        "UPDATE performances SET play_id = $1, theatre_hall_id = $2, show_time = $3 WHERE id = $4
         RETURNING id, play_id, theatre_hall_id, show_time",
    )
    .bind(payload.play)
    .bind(payload.theatre_hall)
    .bind(payload.show_time)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await
    .map_err(map_unknown_reference)?
    .ok_or(ApiError::NotFound("performance"))?;

    Ok(Json(performance))
}

async fn delete_performance(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM performances WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("performance"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_whitelist_covers_all_sortable_columns() {
        assert_eq!(order_clause(None).unwrap(), "p.show_time, p.id");
        for key in [
            "show_time",
            "-show_time",
            "play_title",
            "-play_title",
            "theatre_hall_name",
            "-theatre_hall_name",
            "tickets_available",
            "-tickets_available",
        ] {
            assert!(order_clause(Some(key)).is_ok(), "{} should be accepted", key);
        }
        assert_eq!(
            order_clause(Some("-theatre_hall_name")).unwrap(),
            "h.name DESC, p.id"
        );
    }

    #[test]
    fn unknown_ordering_is_rejected() {
        assert!(order_clause(Some("show_time; DROP TABLE tickets")).is_err());
        assert!(order_clause(Some("id")).is_err());
    }
}
