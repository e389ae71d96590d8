use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::controllers::actors::ActorResponse;
use crate::controllers::PageParams;
use crate::error::ApiError;
use crate::middleware::{AuthUser, StaffUser};
use crate::models::{Actor, Genre, Play};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/plays", get(list_plays).post(create_play))
        .route(
            "/plays/{id}",
            get(get_play).put(update_play).delete(delete_play),
        )
}

#[derive(Debug, Deserialize)]
struct PlaysQuery {
    title: Option<String>,
    genre: Option<i64>,
    actor: Option<i64>,
    #[serde(rename = "durationMin")]
    duration_min: Option<i32>,
    #[serde(rename = "durationMax")]
    duration_max: Option<i32>,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct PlayListItem {
    id: i64,
    title: String,
    description: String,
    duration: i32,
    actors: Vec<i64>,
    genres: Vec<i64>,
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlayDetailResponse {
    id: i64,
    title: String,
    description: String,
    duration: i32,
    actors: Vec<ActorResponse>,
    genres: Vec<Genre>,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayPayload {
    title: String,
    description: String,
    duration: i32,
    #[serde(default)]
    actors: Vec<i64>,
    #[serde(default)]
    genres: Vec<i64>,
    image: Option<String>,
}

fn map_unknown_reference(e: sqlx::Error) -> ApiError {
    if e.as_database_error()
        .is_some_and(|d| d.is_foreign_key_violation())
    {
        ApiError::BadRequest("unknown actor or genre id".to_string())
    } else {
        ApiError::Database(e)
    }
}

// GET /api/plays
//
// Staff see the full catalog. Everyone else sees plays with upcoming
// performances; authenticated users additionally see plays they already hold
// tickets for.
async fn list_plays(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(params): Query<PlaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = PageParams {
        page: params.page,
        page_size: params.page_size,
    }
    .limit_offset();

    let mut q = String::from(
        "SELECT id, title, description, duration, image FROM plays p WHERE TRUE",
    );
    let mut bind_idx = 1;

    if params.title.is_some() {
        q.push_str(&format!(" AND p.title ILIKE ${}", bind_idx));
        bind_idx += 1;
    }
    if params.genre.is_some() {
        q.push_str(&format!(
            " AND EXISTS(SELECT 1 FROM play_genres pg WHERE pg.play_id = p.id AND pg.genre_id = ${})",
            bind_idx
        ));
        bind_idx += 1;
    }
    if params.actor.is_some() {
        q.push_str(&format!(
            " AND EXISTS(SELECT 1 FROM play_actors pa WHERE pa.play_id = p.id AND pa.actor_id = ${})",
            bind_idx
        ));
        bind_idx += 1;
    }
    if params.duration_min.is_some() {
        q.push_str(&format!(" AND p.duration >= ${}", bind_idx));
        bind_idx += 1;
    }
    if params.duration_max.is_some() {
        q.push_str(&format!(" AND p.duration <= ${}", bind_idx));
        bind_idx += 1;
    }

    let is_staff = user.as_ref().is_some_and(|u| u.is_staff);
    if !is_staff {
        q.push_str(
            " AND (EXISTS(SELECT 1 FROM performances pf \
             WHERE pf.play_id = p.id AND pf.show_time >= NOW())",
        );
        if user.is_some() {
            q.push_str(&format!(
                " OR EXISTS(SELECT 1 FROM performances pf \
                 JOIN tickets t ON t.performance_id = pf.id \
                 JOIN reservations r ON r.id = t.reservation_id \
                 WHERE pf.play_id = p.id AND r.user_id = ${})",
                bind_idx
            ));
            bind_idx += 1;
        }
        q.push(')');
    }

    q.push_str(&format!(
        " ORDER BY p.id LIMIT ${} OFFSET ${}",
        bind_idx,
        bind_idx + 1
    ));

    let mut dbq = sqlx::query_as::<_, Play>(&q);
    if let Some(ref title) = params.title {
        dbq = dbq.bind(format!("%{}%", title));
    }
    if let Some(genre) = params.genre {
        dbq = dbq.bind(genre);
    }
    if let Some(actor) = params.actor {
        dbq = dbq.bind(actor);
    }
    if let Some(min) = params.duration_min {
        dbq = dbq.bind(min);
    }
    if let Some(max) = params.duration_max {
        dbq = dbq.bind(max);
    }
    if !is_staff {
        if let Some(ref u) = user {
            dbq = dbq.bind(u.user_id);
        }
    }

    let plays = dbq
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db.pool)
        .await?;

    let play_ids: Vec<i64> = plays.iter().map(|p| p.id).collect();
    let (actor_ids, genre_ids) = related_ids(&state.db.pool, &play_ids).await?;

    let payload: Vec<PlayListItem> = plays
        .into_iter()
        .map(|p| PlayListItem {
            actors: actor_ids.get(&p.id).cloned().unwrap_or_default(),
            genres: genre_ids.get(&p.id).cloned().unwrap_or_default(),
            id: p.id,
            title: p.title,
            description: p.description,
            duration: p.duration,
            image: p.image,
        })
        .collect();

    Ok(Json(payload))
}

/// Actor and genre ids for each play, one query per join table.
async fn related_ids(
    pool: &sqlx::PgPool,
    play_ids: &[i64],
) -> Result<(HashMap<i64, Vec<i64>>, HashMap<i64, Vec<i64>>), ApiError> {
    let actor_rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT play_id, actor_id FROM play_actors WHERE play_id = ANY($1) ORDER BY actor_id",
    )
    .bind(play_ids)
    .fetch_all(pool)
    .await?;

    let genre_rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT play_id, genre_id FROM play_genres WHERE play_id = ANY($1) ORDER BY genre_id",
    )
    .bind(play_ids)
    .fetch_all(pool)
    .await?;

    let mut actors: HashMap<i64, Vec<i64>> = HashMap::new();
    for (play_id, actor_id) in actor_rows {
        actors.entry(play_id).or_default().push(actor_id);
    }
    let mut genres: HashMap<i64, Vec<i64>> = HashMap::new();
    for (play_id, genre_id) in genre_rows {
        genres.entry(play_id).or_default().push(genre_id);
    }

    Ok((actors, genres))
}

// GET /api/plays/{id}
async fn get_play(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let play = sqlx::query_as::<_, Play>(
        "SELECT id, title, description, duration, image FROM plays WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(ApiError::NotFound("play"))?;

    let actors = sqlx::query_as::<_, Actor>(
        "SELECT a.id, a.first_name, a.last_name FROM actors a
         JOIN play_actors pa ON pa.actor_id = a.id
         WHERE pa.play_id = $1 ORDER BY a.id",
    )
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    let genres = sqlx::query_as::<_, Genre>(
        "SELECT g.id, g.name FROM genres g
         JOIN play_genres pg ON pg.genre_id = g.id
         WHERE pg.play_id = $1 ORDER BY g.id",
    )
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(PlayDetailResponse {
        id: play.id,
        title: play.title,
        description: play.description,
        duration: play.duration,
        actors: actors.into_iter().map(ActorResponse::from).collect(),
        genres,
        image: play.image,
    }))
}

async fn insert_relations(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    play_id: i64,
    payload: &PlayPayload,
) -> Result<(), sqlx::Error> {
    for actor_id in &payload.actors {
        sqlx::query("INSERT INTO play_actors (play_id, actor_id) VALUES ($1, $2)")
            .bind(play_id)
            .bind(actor_id)
            .execute(&mut **tx)
            .await?;
    }
    for genre_id in &payload.genres {
        sqlx::query("INSERT INTO play_genres (play_id, genre_id) VALUES ($1, $2)")
            .bind(play_id)
            .bind(genre_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

// POST /api/plays
async fn create_play(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(payload): Json<PlayPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.duration < 1 {
        return Err(ApiError::BadRequest("duration must be > 0".to_string()));
    }

    let mut tx = state.db.pool.begin().await?;

    let play = sqlx::query_as::<_, Play>(
        "INSERT INTO plays (title, description, duration, image) VALUES ($1, $2, $3, $4)
         RETURNING id, title, description, duration, image",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.duration)
    .bind(&payload.image)
    .fetch_one(&mut *tx)
    .await?;

    insert_relations(&mut tx, play.id, &payload)
        .await
        .map_err(map_unknown_reference)?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(play)))
}

// PUT /api/plays/{id}
async fn update_play(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(payload): Json<PlayPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.duration < 1 {
        return Err(ApiError::BadRequest("duration must be > 0".to_string()));
    }

    let mut tx = state.db.pool.begin().await?;

    let play = sqlx::query_as::<_, Play>(
        "UPDATE plays SET title = $1, description = $2, duration = $3, image = $4 WHERE id = $5
         RETURNING id, title, description, duration, image",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.duration)
    .bind(&payload.image)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("play"))?;

    // Replace the relation sets wholesale, matching the payload.
    sqlx::query("DELETE FROM play_actors WHERE play_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM play_genres WHERE play_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_relations(&mut tx, id, &payload)
        .await
        .map_err(map_unknown_reference)?;

    tx.commit().await?;

    Ok(Json(play))
}

async fn delete_play(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM plays WHERE id = $1")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("play"));
    }
    Ok(StatusCode::NO_CONTENT)
}
