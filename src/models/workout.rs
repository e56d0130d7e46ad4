// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout session, per-exercise and set rows, plus volume arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle state of a workout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum WorkoutStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl WorkoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutStatus::InProgress => "in_progress",
            WorkoutStatus::Completed => "completed",
            WorkoutStatus::Cancelled => "cancelled",
        }
    }
}

/// One workout instance, from start until completion or cancellation.
///
/// Stored in `workout_sessions`, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutSession {
    pub id: String,
    /// Owning user
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole minutes between start and end, set on completion
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Workout type (strength, cardio, ...)
    pub workout_type: String,
    pub session_name: String,
    /// Sum of weight × reps over completed sets
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub calories_burned: Option<u32>,
    pub status: WorkoutStatus,
    /// User rating (1-5)
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkoutSession {
    /// Start a fresh in-progress session with zeroed totals.
    pub fn start(
        user_id: &str,
        workout_type: &str,
        session_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            workout_type: workout_type.to_string(),
            session_name: session_name.unwrap_or_else(|| Self::default_name(workout_type)),
            total_volume: 0.0,
            calories_burned: None,
            status: WorkoutStatus::InProgress,
            rating: None,
            notes: None,
            updated_at: now,
        }
    }

    /// Name used when the caller doesn't provide one, e.g. "Strength Workout".
    pub fn default_name(workout_type: &str) -> String {
        let mut chars = workout_type.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => "Custom".to_string(),
        };
        format!("{} Workout", capitalized)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == WorkoutStatus::InProgress
    }

    /// Apply a final state. Only completion records a duration, rating and notes.
    pub fn finish(&mut self, finish: &SessionFinish) {
        self.status = finish.status;
        self.ended_at = Some(finish.ended_at);
        self.updated_at = finish.ended_at;
        if finish.status == WorkoutStatus::Completed {
            self.duration_minutes = Some(duration_minutes(self.started_at, finish.ended_at));
            self.rating = finish.rating;
            self.notes = finish.notes.clone();
        }
    }
}

/// Final state requested for an in-progress session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFinish {
    pub status: WorkoutStatus,
    pub ended_at: DateTime<Utc>,
    pub rating: Option<u8>,
    pub notes: Option<String>,
}

impl SessionFinish {
    pub fn completed(ended_at: DateTime<Utc>, rating: Option<u8>, notes: Option<String>) -> Self {
        Self {
            status: WorkoutStatus::Completed,
            ended_at,
            rating,
            notes,
        }
    }

    pub fn cancelled(ended_at: DateTime<Utc>) -> Self {
        Self {
            status: WorkoutStatus::Cancelled,
            ended_at,
            rating: None,
            notes: None,
        }
    }
}

/// Link between a session and a catalog exercise.
///
/// Stored in `workout_exercises`, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutExercise {
    pub id: String,
    pub session_id: String,
    pub exercise_id: String,
    /// 1-based position within the session
    pub order_index: u32,
    /// Default rest between sets
    pub rest_seconds: u32,
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub completed_sets: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkoutExercise {
    pub fn new(session_id: &str, exercise_id: &str, order_index: u32, rest_seconds: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            exercise_id: exercise_id.to_string(),
            order_index,
            rest_seconds,
            total_volume: 0.0,
            completed_sets: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Store freshly computed totals; the first set also marks the start.
    pub fn apply_totals(&mut self, totals: &VolumeSummary, now: DateTime<Utc>) {
        self.total_volume = totals.total_volume;
        self.completed_sets = totals.completed_sets;
        self.started_at.get_or_insert(now);
    }
}

/// One logged set.
///
/// Stored in `workout_sets`, keyed by `id`. `session_id` and `user_id` are
/// denormalized so a whole session (or user) can be queried in one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutSet {
    pub id: String,
    pub workout_exercise_id: String,
    pub session_id: String,
    pub exercise_id: String,
    pub user_id: String,
    pub set_number: u32,
    pub reps: u32,
    pub weight: f64,
    /// Form quality (1-10)
    #[serde(default)]
    pub form_score: Option<u8>,
    /// RPE (1-10)
    #[serde(default)]
    pub perceived_exertion: Option<u8>,
    #[serde(default)]
    pub equipment: Option<String>,
    pub completed: bool,
    /// Flagged by the backend when the set beats the user's prior best
    #[serde(default)]
    pub is_personal_record: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkoutSet {
    pub fn volume(&self) -> f64 {
        set_volume(self.weight, self.reps)
    }
}

/// Volume contributed by a single set.
pub fn set_volume(weight: f64, reps: u32) -> f64 {
    weight * f64::from(reps)
}

/// Totals over a group of sets. Only completed sets count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeSummary {
    pub total_volume: f64,
    pub completed_sets: u32,
}

impl VolumeSummary {
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a WorkoutSet>) -> Self {
        sets.into_iter()
            .filter(|set| set.completed)
            .fold(Self::default(), |mut acc, set| {
                acc.total_volume += set.volume();
                acc.completed_sets += 1;
                acc
            })
    }
}

/// Session and per-exercise totals derived from one read of a session's sets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetTotals {
    pub session: VolumeSummary,
    pub exercise: VolumeSummary,
}

impl SetTotals {
    pub fn from_session_sets(session_sets: &[WorkoutSet], workout_exercise_id: &str) -> Self {
        Self {
            session: VolumeSummary::from_sets(session_sets),
            exercise: VolumeSummary::from_sets(
                session_sets
                    .iter()
                    .filter(|s| s.workout_exercise_id == workout_exercise_id),
            ),
        }
    }
}

/// Whole minutes elapsed between `started` and `ended`, floored and never negative.
pub fn duration_minutes(started: DateTime<Utc>, ended: DateTime<Utc>) -> u32 {
    let seconds = (ended - started).num_seconds().max(0);
    u32::try_from(seconds / 60).unwrap_or(u32::MAX)
}
