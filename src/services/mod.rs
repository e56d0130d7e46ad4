// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod analytics;
pub mod workout;

pub use analytics::{
    AnalyticsAggregator, AnalyticsDispatcher, AnalyticsJob, DeadLetterLog, HttpAnalyticsClient,
    NoopAnalytics,
};
pub use workout::{CompleteWorkoutRequest, LogSetRequest, WorkoutService};
