//! Time-window conflict detection.

use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::{Executor, Sqlite};

use super::{Scheduler, SchedulingResult};
use crate::db::{timestamp, ConflictingSession};

/// Smallest and largest values of the four-digit-year storage format
const EARLIEST_STORED: &str = "0000-01-01T00:00:00.000Z";
const LATEST_STORED: &str = "9999-12-31T23:59:59.999Z";

/// Render the window around `candidate` as storage-format bounds.
///
/// Ends that fall outside years 0000..=9999 are clamped to the format's limits,
/// since chrono renders such years with a sign and a fifth digit and the text
/// would no longer sort with the stored dates.
fn window_bounds(candidate: DateTime<Utc>, window: Duration) -> (String, String) {
    let start = candidate
        .checked_sub_signed(window)
        .filter(|start| start.year() >= 0)
        .map(timestamp)
        .unwrap_or_else(|| EARLIEST_STORED.to_string());
    let end = candidate
        .checked_add_signed(window)
        .filter(|end| end.year() <= 9999)
        .map(timestamp)
        .unwrap_or_else(|| LATEST_STORED.to_string());
    (start, end)
}

/// Find an active session involving `user_id` whose start lies within
/// `[candidate - window, candidate + window]` (both ends inclusive).
///
/// "Involving" means the user created it or holds one of its joined slots.
/// `exclude_session_id` skips one session, so a user joining a session is
/// never in conflict with that same session. The earliest match is returned.
pub async fn find_conflict<'e, E>(
    executor: E,
    user_id: &str,
    candidate: DateTime<Utc>,
    window: Duration,
    exclude_session_id: Option<&str>,
) -> Result<Option<ConflictingSession>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (window_start, window_end) = window_bounds(candidate, window);

    sqlx::query_as::<_, ConflictingSession>(
        r#"
        SELECT s.id, s.date, s.venue FROM sessions s
        WHERE s.status = 'active'
          AND s.date >= ? AND s.date <= ?
          AND (
            s.created_by = ?
            OR EXISTS (
              SELECT 1 FROM session_players p
              WHERE p.session_id = s.id AND p.user_id = ?
            )
          )
          AND (? IS NULL OR s.id <> ?)
        ORDER BY s.date ASC
        LIMIT 1
        "#,
    )
    .bind(window_start)
    .bind(window_end)
    .bind(user_id)
    .bind(user_id)
    .bind(exclude_session_id)
    .bind(exclude_session_id)
    .fetch_optional(executor)
    .await
}

impl Scheduler {
    /// Whether `user_id` already has an active commitment near `candidate`
    pub async fn has_conflict(
        &self,
        user_id: &str,
        candidate: DateTime<Utc>,
        exclude_session_id: Option<&str>,
    ) -> SchedulingResult<bool> {
        Ok(self
            .find_conflict(user_id, candidate, exclude_session_id)
            .await?
            .is_some())
    }

    /// The colliding session, if any, for user feedback
    pub async fn find_conflict(
        &self,
        user_id: &str,
        candidate: DateTime<Utc>,
        exclude_session_id: Option<&str>,
    ) -> SchedulingResult<Option<ConflictingSession>> {
        let conflict = find_conflict(
            &self.db,
            user_id,
            candidate,
            self.conflict_window,
            exclude_session_id,
        )
        .await?;
        Ok(conflict)
    }
}
