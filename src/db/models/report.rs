//! Admin reporting models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-sport aggregate, keyed by sport id so renamed or same-named sports
/// never merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SportStat {
    pub sport_id: String,
    pub sport_name: String,
    pub sessions: i64,
    pub total_players: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub total_sessions: i64,
    pub sport_stats: Vec<SportStat>,
    pub period: ReportPeriod,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
