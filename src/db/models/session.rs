//! Sessions, joined players and invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{SportSummary, UserSummary};

/// Expected skill level of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SkillLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            _ => Err(format!("Unknown skill level: {}", s)),
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Open for joining until its date passes
    Active,
    /// Called off by its creator; terminal
    Cancelled,
    /// Played; terminal
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Team a joined player has been placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamAssignment {
    Team1,
    Team2,
    Unassigned,
}

impl TeamAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamAssignment::Team1 => "team1",
            TeamAssignment::Team2 => "team2",
            TeamAssignment::Unassigned => "unassigned",
        }
    }
}

impl From<String> for TeamAssignment {
    fn from(s: String) -> Self {
        match s.as_str() {
            "team1" => TeamAssignment::Team1,
            "team2" => TeamAssignment::Team2,
            _ => TeamAssignment::Unassigned,
        }
    }
}

/// Session row as stored
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub sport_id: String,
    pub created_by: String,
    /// JSON array of free-text player names
    pub team1_players: String,
    /// JSON array of free-text player names
    pub team2_players: String,
    pub additional_players_needed: i64,
    pub max_players: i64,
    pub date: String,
    pub venue: String,
    pub description: String,
    pub skill_level: String,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
}

impl Session {
    /// Unknown status text is treated as completed, which blocks every mutation
    pub fn status_enum(&self) -> SessionStatus {
        self.status.parse().unwrap_or(SessionStatus::Completed)
    }

    pub fn date_utc(&self) -> Option<DateTime<Utc>> {
        crate::db::parse_timestamp(&self.date)
    }

    pub fn team1(&self) -> Vec<String> {
        parse_names(&self.team1_players)
    }

    pub fn team2(&self) -> Vec<String> {
        parse_names(&self.team2_players)
    }
}

/// Helper to parse a team name list from its JSON column
pub fn parse_names(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Helper to serialize a team name list for its JSON column
pub fn serialize_names(names: &[String]) -> String {
    serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string())
}

/// Validated input for creating a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub sport_id: String,
    pub team1_players: Vec<String>,
    pub team2_players: Vec<String>,
    pub additional_players_needed: i64,
    pub max_players: i64,
    pub date: DateTime<Utc>,
    pub venue: String,
    pub description: String,
    pub skill_level: SkillLevel,
}

/// Joined-player row with the user's public identity
#[derive(Debug, Clone, FromRow)]
pub struct JoinedPlayerRow {
    pub session_id: String,
    pub user_id: String,
    pub team: String,
    pub joined_at: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionInvitation {
    pub id: String,
    pub session_id: String,
    pub email: String,
    pub status: String,
    pub invited_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPlayer {
    pub user: UserSummary,
    pub joined_at: String,
    pub team: TeamAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitedPlayer {
    pub email: String,
    pub invited_at: String,
    pub status: String,
}

impl From<SessionInvitation> for InvitedPlayer {
    fn from(inv: SessionInvitation) -> Self {
        Self {
            email: inv.email,
            invited_at: inv.invited_at,
            status: inv.status,
        }
    }
}

/// Session with its sport, creator, players and invitations resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub id: String,
    pub sport: SportSummary,
    pub created_by: UserSummary,
    pub team1_players: Vec<String>,
    pub team2_players: Vec<String>,
    pub additional_players_needed: i64,
    pub max_players: i64,
    pub date: String,
    pub venue: String,
    pub description: String,
    pub skill_level: String,
    pub joined_players: Vec<JoinedPlayer>,
    pub invited_players: Vec<InvitedPlayer>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    pub created_at: String,
}

/// The existing commitment that blocks a create or join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ConflictingSession {
    pub id: String,
    pub date: String,
    pub venue: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub sport_id: Option<String>,
    pub team1_players: Option<Vec<String>>,
    pub team2_players: Option<Vec<String>>,
    pub additional_players_needed: Option<i64>,
    pub date: Option<String>,
    pub venue: Option<String>,
    pub description: Option<String>,
    pub skill_level: Option<String>,
    pub max_players: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CancelSessionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub emails: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub message: String,
    pub invited_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// A user's sessions split into created and joined-but-not-created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessions {
    pub created_sessions: Vec<SessionDetail>,
    pub joined_sessions: Vec<SessionDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_created: usize,
    pub total_joined: usize,
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub cancelled_sessions: usize,
    pub total_players_invited: usize,
    pub sports_played: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub created_sessions: Vec<SessionDetail>,
    pub joined_sessions: Vec<SessionDetail>,
    pub stats: ActivityStats,
}
