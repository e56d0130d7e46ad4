// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the repository facade and its backends.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::InMemoryDb;

use crate::error::{AppError, Result};
use crate::models::{
    Exercise, Goal, PersonalRecord, SessionFinish, SetTotals, WorkoutExercise, WorkoutSession,
    WorkoutSet,
};
use crate::realtime::ChangeFeed;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const WORKOUT_SESSIONS: &str = "workout_sessions";
    pub const WORKOUT_EXERCISES: &str = "workout_exercises";
    pub const WORKOUT_SETS: &str = "workout_sets";
    /// Exercise catalog (keyed by exercise id)
    pub const EXERCISES: &str = "exercises";
    pub const PERSONAL_RECORDS: &str = "personal_records";
    pub const USER_GOALS: &str = "user_goals";
}

/// Typed repository over the workout backend.
///
/// Writes publish a row change on [`WorkoutRepository::changes`] once the
/// backend has accepted them.
#[async_trait]
pub trait WorkoutRepository: Send + Sync {
    /// Feed carrying every row change made through this repository.
    fn changes(&self) -> &ChangeFeed;

    // ─── Sessions ────────────────────────────────────────────────

    async fn create_workout_session(&self, session: &WorkoutSession) -> Result<()>;

    async fn get_workout_session(&self, session_id: &str) -> Result<Option<WorkoutSession>>;

    async fn update_workout_session(&self, session: &WorkoutSession) -> Result<()>;

    /// Move an in-progress session to its final state in one atomic step.
    ///
    /// Re-reads the session under the backend's write guard, so totals written
    /// concurrently are kept. Completion also stamps `completed_at` on every
    /// still-open per-exercise row. Fails with `BadRequest` (and writes
    /// nothing) if the session is no longer in progress.
    async fn finish_workout_session(
        &self,
        session_id: &str,
        finish: &SessionFinish,
    ) -> Result<WorkoutSession>;

    /// Sessions for a user, newest first.
    async fn get_workout_sessions_for_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<WorkoutSession>>;

    // ─── Per-exercise rows ───────────────────────────────────────

    async fn create_workout_exercise(&self, workout_exercise: &WorkoutExercise) -> Result<()>;

    /// Per-exercise rows of a session, ordered by `order_index`.
    async fn get_workout_exercises(&self, session_id: &str) -> Result<Vec<WorkoutExercise>>;

    // ─── Sets ────────────────────────────────────────────────────

    /// Insert a completed set and recompute the totals of its session and
    /// per-exercise row, all in one atomic step.
    ///
    /// Totals are derived from a single read of the session's sets taken
    /// under the write guard. Fails with `BadRequest` (and writes nothing)
    /// if the session is no longer in progress.
    async fn record_set(&self, set: &WorkoutSet) -> Result<SetTotals>;

    /// Sets of one per-exercise row, ordered by `set_number`.
    async fn get_workout_sets(&self, workout_exercise_id: &str) -> Result<Vec<WorkoutSet>>;

    /// Every set logged in a session.
    async fn get_session_sets(&self, session_id: &str) -> Result<Vec<WorkoutSet>>;

    // ─── Catalog ─────────────────────────────────────────────────

    async fn get_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>>;

    /// Full catalog, ordered by name.
    async fn get_exercises(&self) -> Result<Vec<Exercise>>;

    /// Catalog entries for one workout type, ordered by name.
    async fn get_exercises_by_workout_type(&self, workout_type: &str) -> Result<Vec<Exercise>>;

    // ─── Records & goals ─────────────────────────────────────────

    /// Personal records for a user, newest first, optionally for one exercise.
    async fn get_personal_records(
        &self,
        user_id: &str,
        exercise_id: Option<&str>,
    ) -> Result<Vec<PersonalRecord>>;

    async fn get_active_goals(&self, user_id: &str) -> Result<Vec<Goal>>;
}

/// Reject writes to a session that has already been completed or cancelled.
pub(crate) fn ensure_in_progress(session: &WorkoutSession) -> Result<()> {
    if session.is_in_progress() {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Workout session {} is {}",
        session.id,
        session.status.as_str()
    )))
}

pub(crate) fn session_not_found(session_id: &str) -> AppError {
    AppError::NotFound(format!("Workout session {} not found", session_id))
}
