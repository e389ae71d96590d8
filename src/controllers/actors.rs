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
use crate::models::Actor;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actors", get(list_actors).post(create_actor))
        .route(
            "/actors/{id}",
            get(get_actor).put(update_actor).delete(delete_actor),
        )
}

#[derive(Debug, Serialize)]
pub struct ActorResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl From<Actor> for ActorResponse {
    fn from(actor: Actor) -> Self {
        let full_name = actor.full_name();
        ActorResponse {
            id: actor.id,
            first_name: actor.first_name,
            last_name: actor.last_name,
            full_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActorPayload {
    first_name: String,
    last_name: String,
}

async fn list_actors(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let actors = sqlx::query_as::<_, Actor>(
        "SELECT id, first_name, last_name FROM actors ORDER BY id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db.pool)
    .await?;

    let payload: Vec<ActorResponse> = actors.into_iter().map(ActorResponse::from).collect();
    Ok(Json(payload))
}

async fn get_actor(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let actor =
        sqlx::query_as::<_, Actor>("SELECT id, first_name, last_name FROM actors WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db.pool)
            .await?
            .ok_or(ApiError::NotFound("actor"))?;

    Ok(Json(ActorResponse::from(actor)))
}

async fn create_actor(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(payload): Json<ActorPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = sqlx::query_as::<_, Actor>(
        "INSERT INTO actors (first_name, last_name) VALUES ($1, $2)
         RETURNING id, first_name, last_name",
    )
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(ActorResponse::from(actor))))
}

async fn update_actor(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(payload): Json<ActorPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = sqlx::query_as::<_, Actor>(
        "UPDATE actors SET first_name = $1, last_name = $2 WHERE id = $3
         RETURNING id, first_name, last_name",
    )
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("actor"))?;

    Ok(Json(ActorResponse::from(actor)))
}

async fn delete_actor(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM actors WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("actor"));
    }
    Ok(StatusCode::NO_CONTENT)
}
