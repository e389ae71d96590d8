use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::controllers::PageParams;
use crate::error::ApiError;
use crate::middleware::StaffUser;
use crate::models::Genre;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/genres", get(list_genres).post(create_genre))
        .route(
            "/genres/{id}",
            get(get_genre).put(update_genre).delete(delete_genre),
        )
}

#[derive(Debug, Deserialize)]
struct GenrePayload {
    name: String,
}

fn map_unique_name(e: sqlx::Error) -> ApiError {
    if e.as_database_error()
        .is_some_and(|d| d.is_unique_violation())
    {
        ApiError::BadRequest("genre with this name already exists".to_string())
    } else {
        ApiError::Database(e)
    }
}

async fn list_genres(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let genres =
        sqlx::query_as::<_, Genre>("SELECT id, name FROM genres ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db.pool)
            .await?;

    Ok(Json(genres))
}

async fn get_genre(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let genre = sqlx::query_as::<_, Genre>("SELECT id, name FROM genres WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(ApiError::NotFound("genre"))?;

    Ok(Json(genre))
}

async fn create_genre(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(payload): Json<GenrePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let genre =
        sqlx::query_as::<_, Genre>("INSERT INTO genres (name) VALUES ($1) RETURNING id, name")
            .bind(&payload.name)
            .fetch_one(&state.db.pool)
            .await
            .map_err(map_unique_name)?;

    Ok((StatusCode::CREATED, Json(genre)))
}

async fn update_genre(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(payload): Json<GenrePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let genre = sqlx::query_as::<_, Genre>(
        "UPDATE genres SET name = $1 WHERE id = $2 RETURNING id, name",
    )
    .bind(&payload.name)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await
    .map_err(map_unique_name)?
    .ok_or(ApiError::NotFound("genre"))?;

    Ok(Json(genre))
}

async fn delete_genre(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM genres WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("genre"));
    }
    Ok(StatusCode::NO_CONTENT)
}
