use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use crate::db::{
    CancelSessionRequest, CreateSessionRequest, InviteRequest, InviteResponse, MessageResponse,
    NewSession, SessionDetail, SkillLevel, UserActivity, UserSessions,
};
use crate::validation::parse_datetime;
use crate::AppState;

/// Check every field of a create request, reporting all problems at once
fn validate_create_request(req: CreateSessionRequest) -> Result<NewSession, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let sport_id = req.sport_id.unwrap_or_default();
    if sport_id.trim().is_empty() {
        errors.add("sportId", "Sport ID is required");
    }

    let date = match req.date.as_deref() {
        None | Some("") => {
            errors.add("date", "Valid date is required");
            None
        }
        Some(raw) => match parse_datetime(raw) {
            Ok(date) => Some(date),
            Err(e) => {
                errors.add("date", e);
                None
            }
        },
    };

    let venue = req.venue.unwrap_or_default();
    if venue.trim().is_empty() {
        errors.add("venue", "Venue is required");
    }

    let skill_level = match req.skill_level.as_deref().map(str::parse::<SkillLevel>) {
        Some(Ok(level)) => Some(level),
        _ => {
            errors.add("skillLevel", "Valid skill level is required");
            None
        }
    };

    let additional_players_needed = match req.additional_players_needed {
        Some(n) if n >= 0 => n,
        _ => {
            errors.add(
                "additionalPlayersNeeded",
                "Additional players needed must be a non-negative integer",
            );
            0
        }
    };

    let max_players = match req.max_players {
        Some(n) if n >= 2 => n,
        _ => {
            errors.add("maxPlayers", "Maximum players must be at least 2");
            0
        }
    };

    errors.finish()?;

    match (date, skill_level) {
        (Some(date), Some(skill_level)) => Ok(NewSession {
            sport_id: sport_id.trim().to_string(),
            team1_players: req.team1_players.unwrap_or_default(),
            team2_players: req.team2_players.unwrap_or_default(),
            additional_players_needed,
            max_players,
            date,
            venue,
            description: req.description.unwrap_or_default(),
            skill_level,
        }),
        _ => Err(ApiError::bad_request("Invalid session request")),
    }
}

/// Active sessions, soonest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionDetail>>, ApiError> {
    Ok(Json(state.scheduler.list_active().await?))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionDetail>), ApiError> {
    let new = validate_create_request(req)?;
    let session = state
        .scheduler
        .create_session(&auth.id, new, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    Ok(Json(state.scheduler.get_session(&id).await?))
}

pub async fn join_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let session = state
        .scheduler
        .join_session(&id, &auth.id, Utc::now())
        .await?;
    Ok(Json(session))
}

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    body: Option<ApiJson<CancelSessionRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    // A missing or unreadable body is treated as a missing reason
    let reason = body.and_then(|ApiJson(req)| req.reason).unwrap_or_default();
    state
        .scheduler
        .cancel_session(&id, &auth.id, &reason)
        .await?;
    Ok(Json(MessageResponse {
        message: "Session cancelled successfully".to_string(),
    }))
}

pub async fn invite_players(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    let emails = req
        .emails
        .ok_or_else(|| ApiError::validation_field("emails", "Emails must be an array"))?;
    let invited_count = state
        .scheduler
        .invite_players(&id, &auth.id, &emails, Utc::now())
        .await?;
    Ok(Json(InviteResponse {
        message: "Invitations sent successfully".to_string(),
        invited_count,
    }))
}

/// The caller's created and joined sessions
pub async fn user_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserSessions>, ApiError> {
    Ok(Json(state.scheduler.list_for_user(&auth.id).await?))
}

pub async fn user_activity(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserActivity>, ApiError> {
    Ok(Json(state.scheduler.user_activity(&auth.id).await?))
}

pub async fn sessions_by_area(
    State(state): State<Arc<AppState>>,
    Path(location): Path<String>,
) -> Result<Json<Vec<SessionDetail>>, ApiError> {
    Ok(Json(state.scheduler.list_by_area(&location).await?))
}

pub async fn sessions_by_sport(
    State(state): State<Arc<AppState>>,
    Path(sport_id): Path<String>,
) -> Result<Json<Vec<SessionDetail>>, ApiError> {
    Ok(Json(state.scheduler.list_by_sport(&sport_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;

    fn request() -> CreateSessionRequest {
        CreateSessionRequest {
            sport_id: Some("football".to_string()),
            team1_players: Some(vec!["Ana".to_string()]),
            team2_players: None,
            additional_players_needed: Some(3),
            date: Some("2030-06-01T10:00:00Z".to_string()),
            venue: Some("Riverside Park".to_string()),
            description: None,
            skill_level: Some("beginner".to_string()),
            max_players: Some(8),
        }
    }

    #[test]
    fn test_valid_create_request() {
        let new = validate_create_request(request()).unwrap();
        assert_eq!(new.sport_id, "football");
        assert_eq!(new.team1_players, vec!["Ana"]);
        assert!(new.team2_players.is_empty());
        assert_eq!(new.skill_level, SkillLevel::Beginner);
        assert_eq!(new.description, "");
    }

    #[test]
    fn test_create_request_reports_every_field() {
        let req = CreateSessionRequest {
            sport_id: None,
            date: Some("next tuesday".to_string()),
            venue: Some("  ".to_string()),
            skill_level: Some("expert".to_string()),
            additional_players_needed: Some(-1),
            max_players: Some(1),
            ..request()
        };

        let err = validate_create_request(req).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.message().contains("6 fields"));
    }
}
