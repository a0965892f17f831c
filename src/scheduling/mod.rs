//! Session scheduling: conflict detection, session lifecycle and reporting.
//!
//! Every mutating operation that depends on a conflict or capacity check
//! (create, join) runs under a per-user lock (join also holds a per-session
//! lock) and performs its checks and its write inside one SQLite transaction,
//! so two concurrent requests can never double-book a user or overfill a
//! session. Write transactions take SQLite's write lock when they begin, so
//! writers on unrelated users and sessions queue on the busy timeout instead of
//! failing when a read lock cannot be upgraded.

mod conflict;
mod lifecycle;
mod locks;
mod report;

pub use conflict::*;
pub use locks::LockTable;

use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;

use crate::db::{ConflictingSession, SessionStatus};
use crate::DbPool;

/// Opens a transaction that holds the database write lock from its first statement
pub(crate) const WRITE_TRANSACTION: &str = "BEGIN IMMEDIATE";

/// Default half-width of the conflict window around a session's start time
pub const DEFAULT_CONFLICT_WINDOW_MINUTES: i64 = 120;

/// Errors produced by scheduling operations
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("You already have a session scheduled around this time. Please choose a different time.")]
    Conflict(ConflictingSession),

    #[error("Session is full")]
    Full,

    #[error("Already joined this session")]
    AlreadyJoined,

    #[error("Cannot join past session")]
    Expired,

    #[error("Session is {0}")]
    InvalidState(SessionStatus),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SchedulingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Owns the store handle and lock table used by every scheduling operation.
#[derive(Clone)]
pub struct Scheduler {
    db: DbPool,
    locks: Arc<LockTable>,
    conflict_window: Duration,
}

impl Scheduler {
    pub fn new(db: DbPool, conflict_window: Duration) -> Self {
        Self {
            db,
            locks: Arc::new(LockTable::new()),
            conflict_window,
        }
    }

    pub fn with_default_window(db: DbPool) -> Self {
        Self::new(db, Duration::minutes(DEFAULT_CONFLICT_WINDOW_MINUTES))
    }

    pub fn conflict_window(&self) -> Duration {
        self.conflict_window
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the scheduling tests.

    use chrono::{DateTime, TimeZone, Utc};

    use super::Scheduler;
    use crate::db::{self, NewSession, SkillLevel};

    /// Fixed "current time" used by every test: 2025-05-01T00:00:00Z
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        db::parse_timestamp(rfc3339).unwrap()
    }

    pub async fn scheduler() -> Scheduler {
        let pool = db::init_in_memory().await.unwrap();
        Scheduler::with_default_window(pool)
    }

    pub async fn insert_user(scheduler: &Scheduler, id: &str, role: &str) {
        let created = db::timestamp(now());
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("User {}", id))
        .bind(format!("{}@example.com", id))
        .bind("not-a-real-hash")
        .bind(role)
        .bind(&created)
        .bind(&created)
        .execute(scheduler.db())
        .await
        .unwrap();
    }

    pub async fn insert_sport(scheduler: &Scheduler, id: &str, name: &str) {
        sqlx::query("INSERT INTO sports (id, name, created_by, created_at) VALUES (?, ?, 'admin', ?)")
            .bind(id)
            .bind(name)
            .bind(db::timestamp(now()))
            .execute(scheduler.db())
            .await
            .unwrap();
    }

    /// A scheduler seeded with an admin, players `alice`, `bob`, `carol`,
    /// `dave`, and the sports `football` and `tennis`.
    pub async fn seeded() -> Scheduler {
        let scheduler = scheduler().await;
        insert_user(&scheduler, "admin", "admin").await;
        for player in ["alice", "bob", "carol", "dave"] {
            insert_user(&scheduler, player, "player").await;
        }
        insert_sport(&scheduler, "football", "Football").await;
        insert_sport(&scheduler, "tennis", "Tennis").await;
        scheduler
    }

    pub fn new_session(date: &str) -> NewSession {
        NewSession {
            sport_id: "football".to_string(),
            team1_players: vec!["Ana".to_string(), "Ben".to_string()],
            team2_players: vec!["Cy".to_string()],
            additional_players_needed: 2,
            max_players: 10,
            date: at(date),
            venue: "Riverside Park, Court 2".to_string(),
            description: String::new(),
            skill_level: SkillLevel::Intermediate,
        }
    }
}
