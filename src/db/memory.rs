// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process repository for offline mode and tests.
//!
//! Mirrors the Firestore collections with one concurrent map per collection
//! and publishes the same row changes. Backend-owned rows (catalog entries,
//! personal records, goals) are written through the inherent `insert_*`
//! methods, which stand in for the hosted backend's own writers.

use crate::db::{ensure_in_progress, session_not_found, WorkoutRepository};
use crate::error::{AppError, Result};
use crate::models::{
    Exercise, Goal, GoalStatus, PersonalRecord, SessionFinish, SetTotals, WorkoutExercise,
    WorkoutSession, WorkoutSet, WorkoutStatus,
};
use crate::realtime::{ChangeFeed, Row, RowChange};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    sessions: DashMap<String, WorkoutSession>,
    workout_exercises: DashMap<String, WorkoutExercise>,
    sets: DashMap<String, WorkoutSet>,
    exercises: DashMap<String, Exercise>,
    personal_records: DashMap<String, PersonalRecord>,
    goals: DashMap<String, Goal>,
    /// When set, every repository call fails like an unreachable backend.
    unavailable: AtomicBool,
    /// Serializes writes to sessions, per-exercise rows and sets.
    writes: Mutex<()>,
}

/// In-memory database. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryDb {
    tables: Arc<Tables>,
    changes: ChangeFeed,
}

impl InMemoryDb {
    pub fn new(changes: ChangeFeed) -> Self {
        Self {
            tables: Arc::default(),
            changes,
        }
    }

    /// Simulate a backend outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.tables.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.tables.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("Backend unavailable".to_string()));
        }
        Ok(())
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.tables
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session(&self, session_id: &str) -> Option<WorkoutSession> {
        self.tables
            .sessions
            .get(session_id)
            .map(|s| s.value().clone())
    }

    pub fn insert_exercise(&self, exercise: Exercise) {
        self.tables.exercises.insert(exercise.id.clone(), exercise);
    }

    pub fn insert_goal(&self, goal: Goal) {
        self.tables.goals.insert(goal.id.clone(), goal);
    }

    /// Store a personal record and publish it, as the backend's record tracker would.
    pub fn insert_personal_record(&self, record: PersonalRecord) {
        self.tables
            .personal_records
            .insert(record.id.clone(), record.clone());
        self.changes.publish(RowChange::Inserted {
            row: Row::PersonalRecords(record),
        });
    }

    pub fn session_count(&self) -> usize {
        self.tables.sessions.len()
    }

    pub fn set_count(&self) -> usize {
        self.tables.sets.len()
    }
}

fn sorted_by_name(mut exercises: Vec<Exercise>) -> Vec<Exercise> {
    exercises.sort_by(|a, b| a.name.cmp(&b.name));
    exercises
}

#[async_trait]
impl WorkoutRepository for InMemoryDb {
    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    async fn create_workout_session(&self, session: &WorkoutSession) -> Result<()> {
        self.check_available()?;
        let _guard = self.write_guard();
        self.tables
            .sessions
            .insert(session.id.clone(), session.clone());
        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutSessions(session.clone()),
        });
        Ok(())
    }

    async fn get_workout_session(&self, session_id: &str) -> Result<Option<WorkoutSession>> {
        self.check_available()?;
        Ok(self.session(session_id))
    }

    async fn update_workout_session(&self, session: &WorkoutSession) -> Result<()> {
        self.check_available()?;
        let _guard = self.write_guard();
        self.tables
            .sessions
            .insert(session.id.clone(), session.clone());
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session.clone()),
        });
        Ok(())
    }

    async fn finish_workout_session(
        &self,
        session_id: &str,
        finish: &SessionFinish,
    ) -> Result<WorkoutSession> {
        self.check_available()?;
        let _guard = self.write_guard();

        let mut session = self
            .session(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        ensure_in_progress(&session)?;
        session.finish(finish);

        self.tables
            .sessions
            .insert(session.id.clone(), session.clone());
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session.clone()),
        });

        if finish.status == WorkoutStatus::Completed {
            let open: Vec<WorkoutExercise> = self
                .tables
                .workout_exercises
                .iter()
                .filter(|we| we.session_id == session_id && we.completed_at.is_none())
                .map(|we| we.value().clone())
                .collect();
            for mut workout_exercise in open {
                workout_exercise.completed_at = Some(finish.ended_at);
                self.tables
                    .workout_exercises
                    .insert(workout_exercise.id.clone(), workout_exercise.clone());
                self.changes.publish(RowChange::Updated {
                    row: Row::WorkoutExercises(workout_exercise),
                });
            }
        }

        Ok(session)
    }

    async fn get_workout_sessions_for_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<WorkoutSession>> {
        self.check_available()?;
        let mut sessions: Vec<WorkoutSession> = self
            .tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn create_workout_exercise(&self, workout_exercise: &WorkoutExercise) -> Result<()> {
        self.check_available()?;
        let _guard = self.write_guard();
        self.tables
            .workout_exercises
            .insert(workout_exercise.id.clone(), workout_exercise.clone());
        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutExercises(workout_exercise.clone()),
        });
        Ok(())
    }

    async fn get_workout_exercises(&self, session_id: &str) -> Result<Vec<WorkoutExercise>> {
        self.check_available()?;
        let mut rows: Vec<WorkoutExercise> = self
            .tables
            .workout_exercises
            .iter()
            .filter(|we| we.session_id == session_id)
            .map(|we| we.value().clone())
            .collect();
        rows.sort_by_key(|we| we.order_index);
        Ok(rows)
    }

    async fn record_set(&self, set: &WorkoutSet) -> Result<SetTotals> {
        self.check_available()?;
        let _guard = self.write_guard();

        let mut session = self
            .session(&set.session_id)
            .ok_or_else(|| session_not_found(&set.session_id))?;
        ensure_in_progress(&session)?;
        let mut workout_exercise = self
            .tables
            .workout_exercises
            .get(&set.workout_exercise_id)
            .map(|we| we.value().clone())
            .filter(|we| we.session_id == set.session_id)
            .ok_or_else(|| AppError::NotFound(AppError::EXERCISE_NOT_IN_WORKOUT.to_string()))?;

        self.tables.sets.insert(set.id.clone(), set.clone());
        let session_sets: Vec<WorkoutSet> = self
            .tables
            .sets
            .iter()
            .filter(|s| s.session_id == set.session_id)
            .map(|s| s.value().clone())
            .collect();
        let totals = SetTotals::from_session_sets(&session_sets, &workout_exercise.id);

        workout_exercise.apply_totals(&totals.exercise, set.created_at);
        self.tables
            .workout_exercises
            .insert(workout_exercise.id.clone(), workout_exercise.clone());

        session.total_volume = totals.session.total_volume;
        session.updated_at = set.created_at;
        self.tables
            .sessions
            .insert(session.id.clone(), session.clone());

        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutSets(set.clone()),
        });
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutExercises(workout_exercise),
        });
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session),
        });
        Ok(totals)
    }

    async fn get_workout_sets(&self, workout_exercise_id: &str) -> Result<Vec<WorkoutSet>> {
        self.check_available()?;
        let mut sets: Vec<WorkoutSet> = self
            .tables
            .sets
            .iter()
            .filter(|s| s.workout_exercise_id == workout_exercise_id)
            .map(|s| s.value().clone())
            .collect();
        sets.sort_by_key(|s| s.set_number);
        Ok(sets)
    }

    async fn get_session_sets(&self, session_id: &str) -> Result<Vec<WorkoutSet>> {
        self.check_available()?;
        Ok(self
            .tables
            .sets
            .iter()
            .filter(|s| s.session_id == session_id)
            .map(|s| s.value().clone())
            .collect())
    }

    async fn get_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>> {
        self.check_available()?;
        Ok(self
            .tables
            .exercises
            .get(exercise_id)
            .map(|e| e.value().clone()))
    }

    async fn get_exercises(&self) -> Result<Vec<Exercise>> {
        self.check_available()?;
        Ok(sorted_by_name(
            self.tables
                .exercises
                .iter()
                .map(|e| e.value().clone())
                .collect(),
        ))
    }

    async fn get_exercises_by_workout_type(&self, workout_type: &str) -> Result<Vec<Exercise>> {
        self.check_available()?;
        Ok(sorted_by_name(
            self.tables
                .exercises
                .iter()
                .filter(|e| e.workout_type == workout_type)
                .map(|e| e.value().clone())
                .collect(),
        ))
    }

    async fn get_personal_records(
        &self,
        user_id: &str,
        exercise_id: Option<&str>,
    ) -> Result<Vec<PersonalRecord>> {
        self.check_available()?;
        let mut records: Vec<PersonalRecord> = self
            .tables
            .personal_records
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| exercise_id.is_none_or(|id| r.exercise_id == id))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.achieved_at.cmp(&a.achieved_at));
        Ok(records)
    }

    async fn get_active_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        self.check_available()?;
        Ok(self
            .tables
            .goals
            .iter()
            .filter(|g| g.user_id == user_id && g.status == GoalStatus::Active)
            .map(|g| g.value().clone())
            .collect())
    }
}
