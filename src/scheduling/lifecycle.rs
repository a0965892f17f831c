//! Session lifecycle: create, join, cancel, invite and the read-side listings.

use chrono::{DateTime, Datelike, Utc};
use sqlx::Connection;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::conflict::find_conflict;
use super::{Scheduler, SchedulingError, SchedulingResult, WRITE_TRANSACTION};
use crate::db::{
    serialize_names, timestamp, ActivityStats, InvitedPlayer, JoinedPlayer, JoinedPlayerRow,
    NewSession, Session, SessionDetail, SessionInvitation, SessionStatus, SportSummary,
    TeamAssignment, UserActivity, UserSessions, UserSummary,
};
use crate::validation::validate_email;

/// Shown when a session's sport row can no longer be resolved
const UNKNOWN_SPORT: &str = "Unknown sport";
/// Shown when a referenced user row can no longer be resolved
const UNKNOWN_USER: &str = "Unknown user";

fn validate_new_session(new: &NewSession, now: DateTime<Utc>) -> SchedulingResult<()> {
    if new.sport_id.trim().is_empty() {
        return Err(SchedulingError::validation("sportId", "Sport ID is required"));
    }
    if new.additional_players_needed < 0 {
        return Err(SchedulingError::validation(
            "additionalPlayersNeeded",
            "Additional players needed must be a non-negative integer",
        ));
    }
    if new.max_players < 2 {
        return Err(SchedulingError::validation(
            "maxPlayers",
            "Maximum players must be at least 2",
        ));
    }
    if new.venue.trim().is_empty() {
        return Err(SchedulingError::validation("venue", "Venue is required"));
    }
    if new.date.year() > 9999 {
        return Err(SchedulingError::validation(
            "date",
            "Session date must have a four-digit year",
        ));
    }
    if new.date <= now {
        return Err(SchedulingError::validation(
            "date",
            "Session date must be in the future",
        ));
    }
    Ok(())
}

impl Scheduler {
    /// Create an active session owned by `creator_id`.
    ///
    /// Fails if the sport is unknown, the date is not after `now`, or the
    /// creator already has an active session within the conflict window.
    pub async fn create_session(
        &self,
        creator_id: &str,
        new: NewSession,
        now: DateTime<Utc>,
    ) -> SchedulingResult<SessionDetail> {
        validate_new_session(&new, now)?;

        let _user_guard = self.locks.lock_user(creator_id).await;
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin_with(WRITE_TRANSACTION).await?;

        let sport: Option<(String,)> = sqlx::query_as("SELECT id FROM sports WHERE id = ?")
            .bind(&new.sport_id)
            .fetch_optional(&mut *tx)
            .await?;
        if sport.is_none() {
            return Err(SchedulingError::NotFound("Sport"));
        }

        if let Some(conflict) =
            find_conflict(&mut *tx, creator_id, new.date, self.conflict_window, None).await?
        {
            debug!(user_id = %creator_id, conflicting_session = %conflict.id, "Create refused: schedule conflict");
            return Err(SchedulingError::Conflict(conflict));
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, sport_id, created_by, team1_players, team2_players,
                additional_players_needed, max_players, date, venue, description,
                skill_level, status, cancellation_reason, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', NULL, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.sport_id)
        .bind(creator_id)
        .bind(serialize_names(&new.team1_players))
        .bind(serialize_names(&new.team2_players))
        .bind(new.additional_players_needed)
        .bind(new.max_players)
        .bind(timestamp(new.date))
        .bind(new.venue.trim())
        .bind(new.description.trim())
        .bind(new.skill_level.as_str())
        .bind(timestamp(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        drop(conn);

        info!(session_id = %id, user_id = %creator_id, date = %timestamp(new.date), "Session created");
        self.get_session(&id).await
    }

    /// Reserve one of the session's open slots for `user_id`.
    pub async fn join_session(
        &self,
        session_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulingResult<SessionDetail> {
        let _user_guard = self.locks.lock_user(user_id).await;
        let _session_guard = self.locks.lock_session(session_id).await;
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin_with(WRITE_TRANSACTION).await?;

        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(SchedulingError::NotFound("Session"))?;

        let status = session.status_enum();
        if status != SessionStatus::Active {
            return Err(SchedulingError::InvalidState(status));
        }

        // An unparseable stored date can never be joined
        let date = match session.date_utc() {
            Some(date) if date > now => date,
            _ => return Err(SchedulingError::Expired),
        };

        let already: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM session_players WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if already.is_some() {
            return Err(SchedulingError::AlreadyJoined);
        }

        let joined: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_players WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        if joined.0 >= session.additional_players_needed {
            return Err(SchedulingError::Full);
        }

        if let Some(conflict) = find_conflict(
            &mut *tx,
            user_id,
            date,
            self.conflict_window,
            Some(session_id),
        )
        .await?
        {
            debug!(user_id = %user_id, session_id = %session_id, conflicting_session = %conflict.id, "Join refused: schedule conflict");
            return Err(SchedulingError::Conflict(conflict));
        }

        // Capacity is re-checked by the insert itself
        let inserted = sqlx::query(
            r#"
            INSERT INTO session_players (session_id, user_id, team, joined_at)
            SELECT ?, ?, ?, ?
            WHERE (SELECT COUNT(*) FROM session_players WHERE session_id = ?) < ?
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(TeamAssignment::Unassigned.as_str())
        .bind(timestamp(now))
        .bind(session_id)
        .bind(session.additional_players_needed)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(SchedulingError::Full);
        }

        tx.commit().await?;
        drop(conn);

        info!(session_id = %session_id, user_id = %user_id, "Player joined session");
        self.get_session(session_id).await
    }

    /// Cancel a session. Only its creator may do so and a reason is required.
    ///
    /// Cancelling an already-cancelled session succeeds without changing
    /// anything; the first reason is kept.
    pub async fn cancel_session(
        &self,
        session_id: &str,
        requester_id: &str,
        reason: &str,
    ) -> SchedulingResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SchedulingError::validation(
                "reason",
                "Cancellation reason is required",
            ));
        }

        let _session_guard = self.locks.lock_session(session_id).await;
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin_with(WRITE_TRANSACTION).await?;

        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(SchedulingError::NotFound("Session"))?;

        if session.created_by != requester_id {
            warn!(session_id = %session_id, user_id = %requester_id, "Cancel refused: not the session creator");
            return Err(SchedulingError::Forbidden("Only session creator can cancel"));
        }

        match session.status_enum() {
            SessionStatus::Cancelled => {
                debug!(session_id = %session_id, "Session already cancelled; nothing to do");
                Ok(())
            }
            SessionStatus::Completed => Err(SchedulingError::InvalidState(SessionStatus::Completed)),
            SessionStatus::Active => {
                sqlx::query(
                    "UPDATE sessions SET status = 'cancelled', cancellation_reason = ? WHERE id = ? AND status = 'active'",
                )
                .bind(reason)
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                info!(session_id = %session_id, user_id = %requester_id, "Session cancelled");
                Ok(())
            }
        }
    }

    /// Record a pending invitation per email. Returns how many were added.
    ///
    /// No deduplication is done against earlier invitations or joined players.
    pub async fn invite_players(
        &self,
        session_id: &str,
        requester_id: &str,
        emails: &[String],
        now: DateTime<Utc>,
    ) -> SchedulingResult<usize> {
        for email in emails {
            validate_email(email.trim())
                .map_err(|e| SchedulingError::validation("emails", e))?;
        }

        let session = self.fetch_session(session_id).await?;

        if session.created_by != requester_id {
            warn!(session_id = %session_id, user_id = %requester_id, "Invite refused: not the session creator");
            return Err(SchedulingError::Forbidden(
                "Only session creator can invite players",
            ));
        }

        let invited_at = timestamp(now);
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin_with(WRITE_TRANSACTION).await?;
        for email in emails {
            sqlx::query(
                "INSERT INTO session_invitations (id, session_id, email, status, invited_at) VALUES (?, ?, ?, 'pending', ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(session_id)
            .bind(email.trim())
            .bind(&invited_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(session_id = %session_id, count = emails.len(), "Players invited");
        Ok(emails.len())
    }

    /// One populated session
    pub async fn get_session(&self, session_id: &str) -> SchedulingResult<SessionDetail> {
        let session = self.fetch_session(session_id).await?;
        let mut populated = self.populate(vec![session]).await?;
        populated
            .pop()
            .ok_or(SchedulingError::NotFound("Session"))
    }

    /// All active sessions, soonest first
    pub async fn list_active(&self) -> SchedulingResult<Vec<SessionDetail>> {
        let sessions = self.active_sessions().await?;
        self.populate(sessions).await
    }

    /// Sessions the user created, and sessions they joined but did not create
    pub async fn list_for_user(&self, user_id: &str) -> SchedulingResult<UserSessions> {
        let created = self.created_by(user_id, "date ASC").await?;
        let joined = self.joined_not_created(user_id, "s.date ASC").await?;

        Ok(UserSessions {
            created_sessions: self.populate(created).await?,
            joined_sessions: self.populate(joined).await?,
        })
    }

    /// Active sessions whose venue contains `location`, ignoring case
    pub async fn list_by_area(&self, location: &str) -> SchedulingResult<Vec<SessionDetail>> {
        let needle = location.trim().to_lowercase();
        let sessions = self
            .active_sessions()
            .await?
            .into_iter()
            .filter(|s| s.venue.to_lowercase().contains(&needle))
            .collect();
        self.populate(sessions).await
    }

    /// Active sessions of one sport
    pub async fn list_by_sport(&self, sport_id: &str) -> SchedulingResult<Vec<SessionDetail>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE status = 'active' AND sport_id = ? ORDER BY date ASC",
        )
        .bind(sport_id)
        .fetch_all(&self.db)
        .await?;
        self.populate(sessions).await
    }

    /// The user's sessions plus summary counters over the ones they created
    pub async fn user_activity(&self, user_id: &str) -> SchedulingResult<UserActivity> {
        let created = self
            .populate(self.created_by(user_id, "created_at DESC").await?)
            .await?;
        let joined = self
            .populate(self.joined_not_created(user_id, "s.date DESC").await?)
            .await?;

        let count_status = |status: SessionStatus| {
            created.iter().filter(|s| s.status == status).count()
        };

        let mut sports_played: Vec<String> = Vec::new();
        for session in created.iter().chain(joined.iter()) {
            if !sports_played.contains(&session.sport.name) {
                sports_played.push(session.sport.name.clone());
            }
        }

        let stats = ActivityStats {
            total_created: created.len(),
            total_joined: joined.len(),
            active_sessions: count_status(SessionStatus::Active),
            completed_sessions: count_status(SessionStatus::Completed),
            cancelled_sessions: count_status(SessionStatus::Cancelled),
            total_players_invited: created.iter().map(|s| s.invited_players.len()).sum(),
            sports_played,
        };

        Ok(UserActivity {
            created_sessions: created,
            joined_sessions: joined,
            stats,
        })
    }

    async fn fetch_session(&self, session_id: &str) -> SchedulingResult<Session> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(SchedulingError::NotFound("Session"))
    }

    async fn active_sessions(&self) -> SchedulingResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE status = 'active' ORDER BY date ASC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(sessions)
    }

    /// `order` is one of the fixed ORDER BY clauses used in this module
    async fn created_by(&self, user_id: &str, order: &str) -> SchedulingResult<Vec<Session>> {
        let sql = format!("SELECT * FROM sessions WHERE created_by = ? ORDER BY {}", order);
        let sessions = sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(sessions)
    }

    async fn joined_not_created(&self, user_id: &str, order: &str) -> SchedulingResult<Vec<Session>> {
        let sql = format!(
            r#"
            SELECT s.* FROM sessions s
            INNER JOIN session_players p ON p.session_id = s.id
            WHERE p.user_id = ? AND s.created_by <> ?
            ORDER BY {}
            "#,
            order
        );
        let sessions = sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(sessions)
    }

    /// Resolve sport, creator, joined players and invitations for each session
    async fn populate(&self, sessions: Vec<Session>) -> SchedulingResult<Vec<SessionDetail>> {
        let mut sports: HashMap<String, SportSummary> = HashMap::new();
        let mut users: HashMap<String, UserSummary> = HashMap::new();
        let mut results = Vec::with_capacity(sessions.len());

        for session in sessions {
            if !sports.contains_key(&session.sport_id) {
                let row: Option<(String,)> = sqlx::query_as("SELECT name FROM sports WHERE id = ?")
                    .bind(&session.sport_id)
                    .fetch_optional(&self.db)
                    .await?;
                sports.insert(
                    session.sport_id.clone(),
                    SportSummary {
                        id: session.sport_id.clone(),
                        name: row.map(|r| r.0).unwrap_or_else(|| UNKNOWN_SPORT.to_string()),
                    },
                );
            }

            if !users.contains_key(&session.created_by) {
                let row: Option<(String, String)> =
                    sqlx::query_as("SELECT name, email FROM users WHERE id = ?")
                        .bind(&session.created_by)
                        .fetch_optional(&self.db)
                        .await?;
                users.insert(
                    session.created_by.clone(),
                    user_summary(&session.created_by, row),
                );
            }

            let players = sqlx::query_as::<_, JoinedPlayerRow>(
                r#"
                SELECT p.session_id, p.user_id, p.team, p.joined_at,
                       u.name AS user_name, u.email AS user_email
                FROM session_players p
                LEFT JOIN users u ON u.id = p.user_id
                WHERE p.session_id = ?
                ORDER BY p.joined_at ASC, p.rowid ASC
                "#,
            )
            .bind(&session.id)
            .fetch_all(&self.db)
            .await?;

            let invitations = sqlx::query_as::<_, SessionInvitation>(
                "SELECT * FROM session_invitations WHERE session_id = ? ORDER BY invited_at ASC, rowid ASC",
            )
            .bind(&session.id)
            .fetch_all(&self.db)
            .await?;

            let sport = sports
                .get(&session.sport_id)
                .cloned()
                .unwrap_or_else(|| SportSummary {
                    id: session.sport_id.clone(),
                    name: UNKNOWN_SPORT.to_string(),
                });
            let created_by = users
                .get(&session.created_by)
                .cloned()
                .unwrap_or_else(|| user_summary(&session.created_by, None));

            results.push(SessionDetail {
                team1_players: session.team1(),
                team2_players: session.team2(),
                status: session.status_enum(),
                id: session.id,
                sport,
                created_by,
                additional_players_needed: session.additional_players_needed,
                max_players: session.max_players,
                date: session.date,
                venue: session.venue,
                description: session.description,
                skill_level: session.skill_level,
                joined_players: players
                    .into_iter()
                    .map(|p| JoinedPlayer {
                        user: UserSummary {
                            name: p.user_name.unwrap_or_else(|| UNKNOWN_USER.to_string()),
                            email: p.user_email.unwrap_or_default(),
                            id: p.user_id,
                        },
                        joined_at: p.joined_at,
                        team: TeamAssignment::from(p.team),
                    })
                    .collect(),
                invited_players: invitations.into_iter().map(InvitedPlayer::from).collect(),
                cancellation_reason: session.cancellation_reason,
                created_at: session.created_at,
            });
        }

        Ok(results)
    }
}

fn user_summary(id: &str, row: Option<(String, String)>) -> UserSummary {
    match row {
        Some((name, email)) => UserSummary {
            id: id.to_string(),
            name,
            email,
        },
        None => UserSummary {
            id: id.to_string(),
            name: UNKNOWN_USER.to_string(),
            email: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_session_persists_active_empty_session() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.sport.name, "Football");
        assert_eq!(session.created_by.id, "alice");
        assert_eq!(session.created_by.email, "alice@example.com");
        assert_eq!(session.team1_players, vec!["Ana", "Ben"]);
        assert_eq!(session.team2_players, vec!["Cy"]);
        assert_eq!(session.date, "2025-06-01T10:00:00.000Z");
        assert_eq!(session.skill_level, "intermediate");
        assert!(session.joined_players.is_empty());
        assert!(session.invited_players.is_empty());
        assert!(session.cancellation_reason.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_sport() {
        let scheduler = seeded().await;
        let mut new = new_session("2025-06-01T10:00:00Z");
        new.sport_id = "curling".to_string();

        let err = scheduler.create_session("alice", new, now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Sport")));
    }

    #[tokio::test]
    async fn test_create_rejects_past_and_present_dates() {
        let scheduler = seeded().await;

        let mut past = new_session("2025-06-01T10:00:00Z");
        past.date = now() - Duration::hours(1);
        let err = scheduler.create_session("alice", past, now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "date", .. }));

        let mut present = new_session("2025-06-01T10:00:00Z");
        present.date = now();
        let err = scheduler.create_session("alice", present, now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "date", .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_capacity() {
        let scheduler = seeded().await;

        let mut negative = new_session("2025-06-01T10:00:00Z");
        negative.additional_players_needed = -1;
        let err = scheduler.create_session("alice", negative, now()).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Validation { field: "additionalPlayersNeeded", .. }
        ));

        let mut tiny = new_session("2025-06-01T10:00:00Z");
        tiny.max_players = 1;
        let err = scheduler.create_session("alice", tiny, now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "maxPlayers", .. }));
    }

    #[tokio::test]
    async fn test_create_conflict_examples() {
        let scheduler = seeded().await;
        let first = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        let err = scheduler
            .create_session("alice", new_session("2025-06-01T11:30:00Z"), now())
            .await
            .unwrap_err();
        match err {
            SchedulingError::Conflict(conflict) => {
                assert_eq!(conflict.id, first.id);
                assert_eq!(conflict.venue, first.venue);
                assert_eq!(conflict.date, first.date);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        scheduler
            .create_session("alice", new_session("2025-06-01T13:00:00Z"), now())
            .await
            .expect("three hours apart is allowed");

        // Another user is unaffected
        scheduler
            .create_session("bob", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_join_until_full() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        scheduler.join_session(&session.id, "bob", now()).await.unwrap();
        let after = scheduler.join_session(&session.id, "carol", now()).await.unwrap();
        assert_eq!(after.joined_players.len(), 2);
        assert_eq!(after.joined_players[0].user.id, "bob");
        assert_eq!(after.joined_players[0].team, TeamAssignment::Unassigned);
        assert_eq!(after.joined_players[1].user.name, "User carol");

        let err = scheduler.join_session(&session.id, "dave", now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Full));
    }

    #[tokio::test]
    async fn test_join_zero_capacity_is_full() {
        let scheduler = seeded().await;
        let mut new = new_session("2025-06-01T10:00:00Z");
        new.additional_players_needed = 0;
        let session = scheduler.create_session("alice", new, now()).await.unwrap();

        let err = scheduler.join_session(&session.id, "bob", now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Full));
    }

    #[tokio::test]
    async fn test_join_twice_is_rejected() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        scheduler.join_session(&session.id, "bob", now()).await.unwrap();
        let err = scheduler.join_session(&session.id, "bob", now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::AlreadyJoined));

        let detail = scheduler.get_session(&session.id).await.unwrap();
        assert_eq!(detail.joined_players.len(), 1);
    }

    #[tokio::test]
    async fn test_join_failure_kinds() {
        let scheduler = seeded().await;

        let err = scheduler.join_session("missing", "bob", now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Session")));

        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        // Once its date has passed the session is expired
        let later = at("2025-06-01T10:00:00Z");
        let err = scheduler.join_session(&session.id, "bob", later).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Expired));

        scheduler
            .cancel_session(&session.id, "alice", "Pitch closed")
            .await
            .unwrap();
        let err = scheduler.join_session(&session.id, "bob", now()).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidState(SessionStatus::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_join_conflicts_with_own_commitments() {
        let scheduler = seeded().await;
        let bobs = scheduler
            .create_session("bob", new_session("2025-06-01T09:00:00Z"), now())
            .await
            .unwrap();
        let near = scheduler
            .create_session("alice", new_session("2025-06-01T10:30:00Z"), now())
            .await
            .unwrap();
        let far = scheduler
            .create_session("carol", new_session("2025-06-01T11:30:00Z"), now())
            .await
            .unwrap();

        let err = scheduler.join_session(&near.id, "bob", now()).await.unwrap_err();
        match err {
            SchedulingError::Conflict(conflict) => assert_eq!(conflict.id, bobs.id),
            other => panic!("expected conflict, got {:?}", other),
        }

        // Exactly 2h30m away from bob's own session
        scheduler.join_session(&far.id, "bob", now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_joined_session_blocks_later_create() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();
        scheduler.join_session(&session.id, "bob", now()).await.unwrap();

        let err = scheduler
            .create_session("bob", new_session("2025-06-01T08:30:00Z"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_joins_never_overfill() {
        let scheduler = seeded().await;
        let mut new = new_session("2025-06-01T10:00:00Z");
        new.additional_players_needed = 1;
        let session = scheduler.create_session("alice", new, now()).await.unwrap();

        let mut handles = Vec::new();
        for player in ["bob", "carol", "dave"] {
            let scheduler = scheduler.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                scheduler.join_session(&id, player, now()).await
            }));
        }

        let mut joined = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => joined += 1,
                Err(SchedulingError::Full) => {}
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!(joined, 1);
        assert_eq!(
            scheduler.get_session(&session.id).await.unwrap().joined_players.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_double_book() {
        let scheduler = seeded().await;
        let mut handles = Vec::new();
        for date in ["2025-06-01T10:00:00Z", "2025-06-01T10:30:00Z", "2025-06-01T11:00:00Z"] {
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .create_session("alice", new_session(date), now())
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(SchedulingError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        let err = scheduler
            .cancel_session(&session.id, "bob", "Not mine")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Forbidden(_)));

        let err = scheduler
            .cancel_session(&session.id, "alice", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "reason", .. }));

        let err = scheduler
            .cancel_session("missing", "alice", "Rain")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Session")));

        let detail = scheduler.get_session(&session.id).await.unwrap();
        assert_eq!(detail.status, SessionStatus::Active);
        assert!(detail.cancellation_reason.is_none());

        scheduler
            .cancel_session(&session.id, "alice", "Rain")
            .await
            .unwrap();
        let detail = scheduler.get_session(&session.id).await.unwrap();
        assert_eq!(detail.status, SessionStatus::Cancelled);
        assert_eq!(detail.cancellation_reason.as_deref(), Some("Rain"));
    }

    #[tokio::test]
    async fn test_cancel_twice_is_a_no_op() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        scheduler.cancel_session(&session.id, "alice", "Rain").await.unwrap();
        scheduler
            .cancel_session(&session.id, "alice", "Different reason")
            .await
            .unwrap();

        let detail = scheduler.get_session(&session.id).await.unwrap();
        assert_eq!(detail.status, SessionStatus::Cancelled);
        assert_eq!(detail.cancellation_reason.as_deref(), Some("Rain"));

        // Still creator-only
        let err = scheduler
            .cancel_session(&session.id, "bob", "Rain")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cancel_completed_is_invalid_state() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();
        sqlx::query("UPDATE sessions SET status = 'completed' WHERE id = ?")
            .bind(&session.id)
            .execute(scheduler.db())
            .await
            .unwrap();

        let err = scheduler
            .cancel_session(&session.id, "alice", "Too late")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidState(SessionStatus::Completed)
        ));
    }

    #[tokio::test]
    async fn test_invite_players() {
        let scheduler = seeded().await;
        let session = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();

        let emails = vec!["friend@example.com".to_string(), "friend@example.com".to_string()];
        let count = scheduler
            .invite_players(&session.id, "alice", &emails, now())
            .await
            .unwrap();
        assert_eq!(count, 2);

        let detail = scheduler.get_session(&session.id).await.unwrap();
        assert_eq!(detail.invited_players.len(), 2, "invitations are not deduplicated");
        assert!(detail.invited_players.iter().all(|i| i.status == "pending"));

        let err = scheduler
            .invite_players(&session.id, "bob", &emails, now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Forbidden(_)));

        let bad = vec!["ok@example.com".to_string(), "not-an-email".to_string()];
        let err = scheduler
            .invite_players(&session.id, "alice", &bad, now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "emails", .. }));
        assert_eq!(
            scheduler.get_session(&session.id).await.unwrap().invited_players.len(),
            2,
            "a rejected batch adds nothing"
        );

        let err = scheduler
            .invite_players("missing", "alice", &emails, now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Session")));
    }

    #[tokio::test]
    async fn test_list_for_user_partitions_created_and_joined() {
        let scheduler = seeded().await;
        let later = scheduler
            .create_session("alice", new_session("2025-06-03T10:00:00Z"), now())
            .await
            .unwrap();
        let earlier = scheduler
            .create_session("alice", new_session("2025-06-02T10:00:00Z"), now())
            .await
            .unwrap();
        let bobs = scheduler
            .create_session("bob", new_session("2025-06-04T10:00:00Z"), now())
            .await
            .unwrap();
        scheduler.join_session(&bobs.id, "alice", now()).await.unwrap();
        // Joining one's own session leaves it in the created list only
        scheduler.join_session(&earlier.id, "alice", now()).await.unwrap();

        let mine = scheduler.list_for_user("alice").await.unwrap();
        let created: Vec<&str> = mine.created_sessions.iter().map(|s| s.id.as_str()).collect();
        let joined: Vec<&str> = mine.joined_sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(created, vec![earlier.id.as_str(), later.id.as_str()]);
        assert_eq!(joined, vec![bobs.id.as_str()]);
    }

    #[tokio::test]
    async fn test_list_by_area_and_sport() {
        let scheduler = seeded().await;
        let mut park = new_session("2025-06-02T10:00:00Z");
        park.venue = "Riverside PARK".to_string();
        let park = scheduler.create_session("alice", park, now()).await.unwrap();

        let mut gym = new_session("2025-06-01T10:00:00Z");
        gym.venue = "Downtown Gym".to_string();
        gym.sport_id = "tennis".to_string();
        let gym = scheduler.create_session("bob", gym, now()).await.unwrap();

        let mut cancelled = new_session("2025-06-01T18:00:00Z");
        cancelled.venue = "Parkside".to_string();
        let cancelled = scheduler.create_session("carol", cancelled, now()).await.unwrap();
        scheduler
            .cancel_session(&cancelled.id, "carol", "No players")
            .await
            .unwrap();

        let by_area = scheduler.list_by_area("park").await.unwrap();
        assert_eq!(by_area.len(), 1);
        assert_eq!(by_area[0].id, park.id);

        let by_sport = scheduler.list_by_sport("tennis").await.unwrap();
        assert_eq!(by_sport.len(), 1);
        assert_eq!(by_sport[0].id, gym.id);

        let active = scheduler.list_active().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![gym.id.as_str(), park.id.as_str()]);
    }

    #[tokio::test]
    async fn test_user_activity_stats() {
        let scheduler = seeded().await;
        let first = scheduler
            .create_session("alice", new_session("2025-06-01T10:00:00Z"), now())
            .await
            .unwrap();
        let mut tennis = new_session("2025-06-02T10:00:00Z");
        tennis.sport_id = "tennis".to_string();
        let second = scheduler.create_session("alice", tennis, now()).await.unwrap();
        scheduler.cancel_session(&second.id, "alice", "Injury").await.unwrap();
        scheduler
            .invite_players(
                &first.id,
                "alice",
                &["x@example.com".to_string(), "y@example.com".to_string()],
                now(),
            )
            .await
            .unwrap();

        let bobs = scheduler
            .create_session("bob", new_session("2025-06-05T10:00:00Z"), now())
            .await
            .unwrap();
        scheduler.join_session(&bobs.id, "alice", now()).await.unwrap();

        let activity = scheduler.user_activity("alice").await.unwrap();
        assert_eq!(activity.stats.total_created, 2);
        assert_eq!(activity.stats.total_joined, 1);
        assert_eq!(activity.stats.active_sessions, 1);
        assert_eq!(activity.stats.cancelled_sessions, 1);
        assert_eq!(activity.stats.completed_sessions, 0);
        assert_eq!(activity.stats.total_players_invited, 2);
        assert_eq!(activity.stats.sports_played.len(), 2);
        assert!(activity.stats.sports_played.contains(&"Football".to_string()));
        assert!(activity.stats.sports_played.contains(&"Tennis".to_string()));
        assert_eq!(activity.joined_sessions[0].id, bobs.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = crate::db::init(dir.path()).await.unwrap();
        let scheduler = Scheduler::with_default_window(pool);
        insert_user(&scheduler, "admin", "admin").await;
        insert_sport(&scheduler, "football", "Football").await;

        let mut session_ids = Vec::new();
        for i in 0..20 {
            let creator = format!("creator{}", i);
            insert_user(&scheduler, &creator, "player").await;
            insert_user(&scheduler, &format!("joiner{}", i), "player").await;
            let session = scheduler
                .create_session(&creator, new_session("2025-06-01T10:00:00Z"), now())
                .await
                .unwrap();
            session_ids.push(session.id);
        }

        // Distinct users on distinct sessions share no lock, only the database
        let mut handles = Vec::new();
        for (i, session_id) in session_ids.iter().cloned().enumerate() {
            let joiner = scheduler.clone();
            let id = session_id.clone();
            handles.push(tokio::spawn(async move {
                joiner
                    .join_session(&id, &format!("joiner{}", i), now())
                    .await
                    .map(|_| ())
            }));

            let inviter = scheduler.clone();
            handles.push(tokio::spawn(async move {
                inviter
                    .invite_players(
                        &session_id,
                        &format!("creator{}", i),
                        &["friend@example.com".to_string()],
                        now(),
                    )
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for (i, session_id) in session_ids.iter().enumerate() {
            let session = scheduler.get_session(session_id).await.unwrap();
            assert_eq!(session.joined_players.len(), 1);
            assert_eq!(session.joined_players[0].user.id, format!("joiner{}", i));
            assert_eq!(session.invited_players.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_create_rejects_five_digit_years() {
        use chrono::TimeZone;

        let scheduler = seeded().await;
        let mut new = new_session("2025-06-01T10:00:00Z");
        new.date = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let err = scheduler.create_session("alice", new, now()).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Validation { field: "date", .. }));
    }
}
