// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout service.
//!
//! Stateless facade over the workout repository. Every operation:
//! 1. Requires an authenticated caller
//! 2. Issues repository reads/writes
//! 3. Reshapes the rows into response objects
//!
//! Failures are logged and returned unchanged. The only side effect that
//! never reaches the caller is the analytics job queued on completion.

use crate::db::{ensure_in_progress, session_not_found, WorkoutRepository};
use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, Caller};
use crate::models::{
    Exercise, PersonalRecord, SessionFinish, WorkoutExercise, WorkoutSession, WorkoutSet,
};
use crate::realtime::{ChangeFilter, Subscription};
use crate::services::analytics::{AnalyticsAggregator, AnalyticsDispatcher, AnalyticsJob};
use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const MAX_CONCURRENT_DB_OPS: usize = 16;
/// Rest time given to every exercise when a session starts.
pub const DEFAULT_REST_SECONDS: u32 = 60;
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const MAX_HISTORY_LIMIT: u32 = 100;

// ─── Requests ────────────────────────────────────────────────

/// A set to log against a session.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogSetRequest {
    #[validate(length(min = 1, max = 128))]
    pub exercise_id: String,
    #[validate(range(min = 1))]
    pub set_number: u32,
    pub reps: u32,
    #[validate(range(min = 0.0))]
    pub weight: f64,
    #[validate(range(min = 1, max = 10))]
    pub form_score: Option<u8>,
    #[validate(range(min = 1, max = 10))]
    pub perceived_exertion: Option<u8>,
    #[validate(length(max = 100))]
    pub equipment: Option<String>,
}

/// Optional feedback given when finishing a workout.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CompleteWorkoutRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<u8>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

// ─── Responses ───────────────────────────────────────────────

/// Per-exercise row together with its catalog entry.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutExerciseEntry {
    pub workout_exercise: WorkoutExercise,
    pub exercise: Exercise,
}

/// Result of starting a workout.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartedWorkout {
    pub session: WorkoutSession,
    pub exercises: Vec<WorkoutExerciseEntry>,
}

/// Result of logging a set, with the recomputed totals.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LoggedSet {
    pub set: WorkoutSet,
    pub exercise_volume: f64,
    pub exercise_completed_sets: u32,
    pub session_volume: f64,
}

/// One exercise of a session with its set history.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ExerciseWithSets {
    pub workout_exercise: WorkoutExercise,
    /// `None` if the catalog entry has since been removed
    pub exercise: Option<Exercise>,
    pub sets: Vec<WorkoutSet>,
}

/// A session with every exercise and set.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutSessionDetail {
    pub session: WorkoutSession,
    pub exercises: Vec<ExerciseWithSets>,
}

// ─── Service ─────────────────────────────────────────────────

/// Workout operations over an injected repository.
#[derive(Clone)]
pub struct WorkoutService {
    repo: Arc<dyn WorkoutRepository>,
    analytics: AnalyticsDispatcher,
}

impl WorkoutService {
    pub fn new(repo: Arc<dyn WorkoutRepository>, aggregator: Arc<dyn AnalyticsAggregator>) -> Self {
        let analytics = AnalyticsDispatcher::new(aggregator, repo.clone());
        Self { repo, analytics }
    }

    /// Dispatcher running post-completion analytics jobs.
    pub fn analytics(&self) -> &AnalyticsDispatcher {
        &self.analytics
    }

    /// Load a session owned by `user`. Sessions of other users are reported
    /// as missing.
    async fn load_owned_session(
        &self,
        user: &AuthUser,
        session_id: &str,
    ) -> Result<Option<WorkoutSession>> {
        match self.repo.get_workout_session(session_id).await? {
            Some(session) if session.user_id == user.user_id => Ok(Some(session)),
            Some(_) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    session_id,
                    "Session belongs to another user"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn require_owned_session(
        &self,
        user: &AuthUser,
        session_id: &str,
    ) -> Result<WorkoutSession> {
        self.load_owned_session(user, session_id)
            .await?
            .ok_or_else(|| session_not_found(session_id))
    }

    /// Start a session with the given exercises, in order.
    ///
    /// Each exercise id may appear only once; a repeated id is rejected with
    /// `BadRequest`, since sets are logged against the exercise id and a
    /// second row for it could never be addressed. Every id must exist in the
    /// catalog. Nothing is written unless both checks pass.
    pub async fn start_workout(
        &self,
        caller: &Caller,
        workout_type: &str,
        exercise_ids: &[String],
        session_name: Option<String>,
    ) -> Result<StartedWorkout> {
        let result: Result<StartedWorkout> = async {
            let user = caller.require()?;

            let workout_type = workout_type.trim();
            if workout_type.is_empty() {
                return Err(AppError::BadRequest("workout_type is required".to_string()));
            }

            let mut seen = HashSet::new();
            if let Some(dup) = exercise_ids.iter().find(|id| !seen.insert(id.as_str())) {
                return Err(AppError::BadRequest(format!(
                    "Exercise {} listed more than once",
                    dup
                )));
            }

            // Resolve the whole catalog before writing anything.
            let repo = &self.repo;
            let exercises: Vec<Exercise> = stream::iter(exercise_ids.to_vec())
                .map(|id| async move {
                    repo.get_exercise(&id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("Exercise {} not found", id)))
                })
                .buffered(MAX_CONCURRENT_DB_OPS)
                .try_collect()
                .await?;

            let session_name = session_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty());
            let session =
                WorkoutSession::start(&user.user_id, workout_type, session_name, Utc::now());
            self.repo.create_workout_session(&session).await?;

            let mut entries = Vec::with_capacity(exercises.len());
            for (position, exercise) in exercises.into_iter().enumerate() {
                let workout_exercise = WorkoutExercise::new(
                    &session.id,
                    &exercise.id,
                    position as u32 + 1,
                    DEFAULT_REST_SECONDS,
                );
                self.repo.create_workout_exercise(&workout_exercise).await?;
                entries.push(WorkoutExerciseEntry {
                    workout_exercise,
                    exercise,
                });
            }

            tracing::info!(
                user_id = %user.user_id,
                session_id = %session.id,
                workout_type,
                exercises = entries.len(),
                "Workout started"
            );

            Ok(StartedWorkout {
                session,
                exercises: entries,
            })
        }
        .await;

        log_failure("start_workout", result)
    }

    /// Log a completed set and recompute session and exercise volume.
    ///
    /// The insert and both totals are one atomic repository step, derived
    /// from the same read of the session's sets, so they always agree and a
    /// concurrent completion or cancellation is never undone.
    pub async fn log_set(
        &self,
        caller: &Caller,
        session_id: &str,
        request: LogSetRequest,
    ) -> Result<LoggedSet> {
        let result: Result<LoggedSet> = async {
            let user = caller.require()?;
            request.validate()?;

            let session = self.require_owned_session(user, session_id).await?;
            ensure_in_progress(&session)?;

            let workout_exercise = self
                .repo
                .get_workout_exercises(session_id)
                .await?
                .into_iter()
                .find(|we| we.exercise_id == request.exercise_id)
                .ok_or_else(|| AppError::NotFound(AppError::EXERCISE_NOT_IN_WORKOUT.to_string()))?;

            let now = Utc::now();
            let set = WorkoutSet {
                id: uuid::Uuid::new_v4().to_string(),
                workout_exercise_id: workout_exercise.id,
                session_id: session_id.to_string(),
                exercise_id: request.exercise_id,
                user_id: user.user_id.clone(),
                set_number: request.set_number,
                reps: request.reps,
                weight: request.weight,
                form_score: request.form_score,
                perceived_exertion: request.perceived_exertion,
                equipment: request.equipment,
                completed: true,
                is_personal_record: false,
                created_at: now,
                completed_at: Some(now),
            };
            let totals = self.repo.record_set(&set).await?;

            tracing::debug!(
                session_id,
                exercise_id = %set.exercise_id,
                set_number = set.set_number,
                session_volume = totals.session.total_volume,
                "Set logged"
            );

            Ok(LoggedSet {
                set,
                exercise_volume: totals.exercise.total_volume,
                exercise_completed_sets: totals.exercise.completed_sets,
                session_volume: totals.session.total_volume,
            })
        }
        .await;

        log_failure("log_set", result)
    }

    /// Finish a session and queue the analytics refresh.
    pub async fn complete_workout(
        &self,
        caller: &Caller,
        session_id: &str,
        request: CompleteWorkoutRequest,
    ) -> Result<WorkoutSession> {
        let result: Result<WorkoutSession> = async {
            let user = caller.require()?;
            request.validate()?;

            self.require_owned_session(user, session_id).await?;
            let finish = SessionFinish::completed(Utc::now(), request.rating, request.notes);
            let session = self
                .repo
                .finish_workout_session(session_id, &finish)
                .await?;

            tracing::info!(
                user_id = %user.user_id,
                session_id,
                duration_minutes = ?session.duration_minutes,
                total_volume = session.total_volume,
                "Workout completed"
            );

            self.analytics.dispatch(AnalyticsJob {
                session_id: session.id.clone(),
                user_id: user.user_id.clone(),
            });

            Ok(session)
        }
        .await;

        log_failure("complete_workout", result)
    }

    /// Abandon a session. Totals are left as they are.
    pub async fn cancel_workout(&self, caller: &Caller, session_id: &str) -> Result<WorkoutSession> {
        let result: Result<WorkoutSession> = async {
            let user = caller.require()?;

            self.require_owned_session(user, session_id).await?;
            let session = self
                .repo
                .finish_workout_session(session_id, &SessionFinish::cancelled(Utc::now()))
                .await?;

            tracing::info!(user_id = %user.user_id, session_id, "Workout cancelled");
            Ok(session)
        }
        .await;

        log_failure("cancel_workout", result)
    }

    /// Session with its exercises and sets, or `None` if there is no such session.
    pub async fn get_workout_session(
        &self,
        caller: &Caller,
        session_id: &str,
    ) -> Result<Option<WorkoutSessionDetail>> {
        let result: Result<Option<WorkoutSessionDetail>> = async {
            let user = caller.require()?;

            let Some(session) = self.load_owned_session(user, session_id).await? else {
                return Ok(None);
            };

            let workout_exercises = self.repo.get_workout_exercises(session_id).await?;

            let repo = &self.repo;
            let exercises: Vec<ExerciseWithSets> = stream::iter(workout_exercises)
                .map(|workout_exercise| async move {
                    let (exercise, sets) = tokio::try_join!(
                        repo.get_exercise(&workout_exercise.exercise_id),
                        repo.get_workout_sets(&workout_exercise.id),
                    )?;
                    Ok::<_, AppError>(ExerciseWithSets {
                        workout_exercise,
                        exercise,
                        sets,
                    })
                })
                .buffered(MAX_CONCURRENT_DB_OPS)
                .try_collect()
                .await?;

            Ok(Some(WorkoutSessionDetail { session, exercises }))
        }
        .await;

        log_failure("get_workout_session", result)
    }

    /// Most recent sessions of a user, newest first.
    pub async fn get_workout_history(
        &self,
        caller: &Caller,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<WorkoutSession>> {
        let result: Result<Vec<WorkoutSession>> = async {
            require_self(caller, user_id)?;
            let limit = limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .clamp(1, MAX_HISTORY_LIMIT);
            self.repo.get_workout_sessions_for_user(user_id, limit).await
        }
        .await;

        log_failure("get_workout_history", result)
    }

    pub async fn get_personal_records(
        &self,
        caller: &Caller,
        user_id: &str,
        exercise_id: Option<&str>,
    ) -> Result<Vec<PersonalRecord>> {
        let result: Result<Vec<PersonalRecord>> = async {
            require_self(caller, user_id)?;
            self.repo.get_personal_records(user_id, exercise_id).await
        }
        .await;

        log_failure("get_personal_records", result)
    }

    pub async fn get_exercises_by_type(
        &self,
        caller: &Caller,
        workout_type: &str,
    ) -> Result<Vec<Exercise>> {
        let result: Result<Vec<Exercise>> = async {
            caller.require()?;
            self.repo.get_exercises_by_workout_type(workout_type).await
        }
        .await;

        log_failure("get_exercises_by_type", result)
    }

    pub async fn get_all_exercises(&self, caller: &Caller) -> Result<Vec<Exercise>> {
        let result: Result<Vec<Exercise>> = async {
            caller.require()?;
            self.repo.get_exercises().await
        }
        .await;

        log_failure("get_all_exercises", result)
    }

    /// Changes to a session row, its exercises and its sets.
    pub async fn subscribe_to_workout_session(
        &self,
        caller: &Caller,
        session_id: &str,
    ) -> Result<Subscription> {
        let result: Result<Subscription> = async {
            let user = caller.require()?;
            // Subscribe before the ownership check so nothing published in
            // between is missed.
            let subscription = self
                .repo
                .changes()
                .subscribe(ChangeFilter::workout_session(session_id));
            self.require_owned_session(user, session_id).await?;

            tracing::debug!(user_id = %user.user_id, session_id, "Subscribed to workout session");
            Ok(subscription)
        }
        .await;

        log_failure("subscribe_to_workout_session", result)
    }

    /// New and updated personal records of a user.
    pub async fn subscribe_to_personal_records(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> Result<Subscription> {
        let result: Result<Subscription> = async {
            require_self(caller, user_id)?;
            tracing::debug!(user_id, "Subscribed to personal records");
            Ok(self
                .repo
                .changes()
                .subscribe(ChangeFilter::personal_records(user_id)))
        }
        .await;

        log_failure("subscribe_to_personal_records", result)
    }
}

/// Callers may only read their own history and records.
fn require_self<'a>(caller: &'a Caller, user_id: &str) -> Result<&'a AuthUser> {
    let user = caller.require()?;
    if user.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

/// Log a failed operation and hand the error back unchanged.
fn log_failure<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        match e {
            AppError::Database(_) | AppError::Analytics(_) | AppError::Internal(_) => {
                tracing::error!(operation, error = %e, "Workout operation failed");
            }
            _ => tracing::warn!(operation, error = %e, "Workout operation rejected"),
        }
    }
    result
}
