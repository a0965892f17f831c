use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::auth::AuthUser;
use super::error::{ApiError, ApiJson};
use crate::db::{
    timestamp, CreateSportRequest, DuplicateCleanupResponse, MessageResponse, RemovedSport, Sport,
    SportResponse, SportWithCreatorRow,
};
use crate::validation::validate_name;
use crate::{AppState, DbPool};

const SPORT_WITH_CREATOR: &str = r#"
    SELECT s.id, s.name, s.created_at, s.created_by,
           u.name AS creator_name, u.email AS creator_email
    FROM sports s
    LEFT JOIN users u ON u.id = s.created_by
"#;

async fn fetch_sport(db: &DbPool, id: &str) -> Result<SportResponse, ApiError> {
    let sql = format!("{} WHERE s.id = ?", SPORT_WITH_CREATOR);
    let row = sqlx::query_as::<_, SportWithCreatorRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Sport not found"))?;
    Ok(SportResponse::from(row))
}

async fn session_count(db: &DbPool, sport_id: &str) -> Result<i64, ApiError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE sport_id = ?")
        .bind(sport_id)
        .fetch_one(db)
        .await?;
    Ok(count.0)
}

/// List all sports with their creators, by name
pub async fn list_sports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SportResponse>>, ApiError> {
    let sql = format!("{} ORDER BY s.name ASC, s.created_at ASC", SPORT_WITH_CREATOR);
    let rows = sqlx::query_as::<_, SportWithCreatorRow>(&sql)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows.into_iter().map(SportResponse::from).collect()))
}

pub async fn create_sport(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateSportRequest>,
) -> Result<(StatusCode, Json<SportResponse>), ApiError> {
    let name = req.name.unwrap_or_default();
    validate_name(&name, "Sport name").map_err(|e| ApiError::validation_field("name", e))?;

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sports (id, name, created_by, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name.trim())
        .bind(&auth.id)
        .bind(timestamp(Utc::now()))
        .execute(&state.db)
        .await?;

    info!(sport_id = %id, user_id = %auth.id, "Sport created");

    let sport = fetch_sport(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(sport)))
}

/// Delete a sport no session refers to
pub async fn delete_sport(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let sport = sqlx::query_as::<_, Sport>("SELECT * FROM sports WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Sport not found"))?;

    let sessions = session_count(&state.db, &sport.id).await?;
    if sessions > 0 {
        return Err(ApiError::conflict(format!(
            "Sport is used by {} session(s) and cannot be deleted",
            sessions
        )));
    }

    sqlx::query("DELETE FROM sports WHERE id = ?")
        .bind(&sport.id)
        .execute(&state.db)
        .await?;

    info!(sport_id = %sport.id, "Sport deleted");

    Ok(Json(MessageResponse {
        message: "Sport deleted successfully".to_string(),
    }))
}

/// Remove same-named sports, keeping the oldest of each name.
///
/// Duplicates that sessions still reference are left in place and reported.
pub async fn cleanup_duplicates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DuplicateCleanupResponse>, ApiError> {
    let sports = sqlx::query_as::<_, Sport>(
        "SELECT * FROM sports ORDER BY created_at ASC, rowid ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let mut by_name: HashMap<&str, Vec<&Sport>> = HashMap::new();
    let mut names: Vec<&str> = Vec::new();
    for sport in &sports {
        let group = by_name.entry(sport.name.as_str()).or_default();
        if group.is_empty() {
            names.push(sport.name.as_str());
        }
        group.push(sport);
    }

    let mut deleted_sports = Vec::new();
    let mut skipped_sports = Vec::new();

    for name in names {
        let Some(group) = by_name.get(name) else {
            continue;
        };
        for duplicate in group.iter().skip(1) {
            let removed = RemovedSport {
                id: duplicate.id.clone(),
                name: duplicate.name.clone(),
            };
            if session_count(&state.db, &duplicate.id).await? > 0 {
                skipped_sports.push(removed);
                continue;
            }
            sqlx::query("DELETE FROM sports WHERE id = ?")
                .bind(&duplicate.id)
                .execute(&state.db)
                .await?;
            deleted_sports.push(removed);
        }
    }

    info!(
        deleted = deleted_sports.len(),
        skipped = skipped_sports.len(),
        "Duplicate sports cleaned up"
    );

    Ok(Json(DuplicateCleanupResponse {
        message: format!(
            "Cleanup completed. Deleted {} duplicate sports.",
            deleted_sports.len()
        ),
        deleted_count: deleted_sports.len(),
        deleted_sports,
        skipped_sports,
    }))
}
