// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod exercise;
pub mod goal;
pub mod workout;

pub use exercise::{Exercise, PersonalRecord, RecordType};
pub use goal::{Goal, GoalStatus};
pub use workout::{
    duration_minutes, set_volume, SessionFinish, SetTotals, VolumeSummary, WorkoutExercise,
    WorkoutSession, WorkoutSet, WorkoutStatus,
};
