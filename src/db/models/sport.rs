//! Sport categories.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sport {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}

/// Sport row joined with its creator's public identity
#[derive(Debug, Clone, FromRow)]
pub struct SportWithCreatorRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub created_by: String,
    pub creator_name: Option<String>,
    pub creator_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportResponse {
    pub id: String,
    pub name: String,
    pub created_by: Option<UserSummary>,
    pub created_at: String,
}

impl From<SportWithCreatorRow> for SportResponse {
    fn from(row: SportWithCreatorRow) -> Self {
        let created_by = match (row.creator_name, row.creator_email) {
            (Some(name), Some(email)) => Some(UserSummary {
                id: row.created_by,
                name,
                email,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            name: row.name,
            created_by,
            created_at: row.created_at,
        }
    }
}

/// Sport reference embedded in populated sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSportRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedSport {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCleanupResponse {
    pub message: String,
    pub deleted_count: usize,
    pub deleted_sports: Vec<RemovedSport>,
    /// Duplicates kept because sessions still reference them
    pub skipped_sports: Vec<RemovedSport>,
}
