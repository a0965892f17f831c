use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{ReportPeriod, ReportQuery, SessionReport};
use crate::validation::{parse_date_bound, DayBound};
use crate::AppState;

/// Session counts per sport, optionally limited to a date range.
///
/// The range only applies when both `startDate` and `endDate` are given.
pub async fn session_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<SessionReport>, ApiError> {
    let start = query.start_date.filter(|s| !s.trim().is_empty());
    let end = query.end_date.filter(|s| !s.trim().is_empty());

    let range = match (&start, &end) {
        (Some(start), Some(end)) => {
            let mut errors = ValidationErrorBuilder::new();
            let from = parse_date_bound(start, DayBound::Start)
                .map_err(|e| errors.add("startDate", e))
                .ok();
            let to = parse_date_bound(end, DayBound::End)
                .map_err(|e| errors.add("endDate", e))
                .ok();
            errors.finish()?;
            from.zip(to)
        }
        _ => None,
    };

    let period = ReportPeriod {
        start_date: start,
        end_date: end,
    };
    Ok(Json(state.scheduler.report(range, period).await?))
}
