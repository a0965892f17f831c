//! Per-sport session aggregates for the admin dashboard.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Scheduler, SchedulingResult};
use crate::db::{timestamp, ReportPeriod, SessionReport, SportStat};

impl Scheduler {
    /// Count sessions and joined players per sport, over every status.
    ///
    /// With `range`, only sessions whose date lies in `[start, end]` are
    /// counted. `period` is echoed back unchanged.
    pub async fn report(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        period: ReportPeriod,
    ) -> SchedulingResult<SessionReport> {
        let (start, end) = match range {
            Some((start, end)) => (Some(timestamp(start)), Some(timestamp(end))),
            None => (None, None),
        };

        let sport_stats = sqlx::query_as::<_, SportStat>(
            r#"
            SELECT
                s.sport_id AS sport_id,
                COALESCE(sp.name, 'Unknown sport') AS sport_name,
                COUNT(*) AS sessions,
                COALESCE(SUM(
                    (SELECT COUNT(*) FROM session_players p WHERE p.session_id = s.id)
                ), 0) AS total_players
            FROM sessions s
            LEFT JOIN sports sp ON sp.id = s.sport_id
            WHERE (? IS NULL OR s.date >= ?)
              AND (? IS NULL OR s.date <= ?)
            GROUP BY s.sport_id
            ORDER BY sessions DESC, sport_name ASC
            "#,
        )
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .fetch_all(&self.db)
        .await?;

        let total_sessions: i64 = sport_stats.iter().map(|s| s.sessions).sum();
        debug!(total_sessions, sports = sport_stats.len(), "Session report built");

        Ok(SessionReport {
            total_sessions,
            sport_stats,
            period,
        })
    }
}
