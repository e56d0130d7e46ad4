// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use fitforge_workouts::config::Config;
use fitforge_workouts::db::{FirestoreDb, InMemoryDb};
use fitforge_workouts::error::{AppError, Result};
use fitforge_workouts::models::Exercise;
use fitforge_workouts::realtime::ChangeFeed;
use fitforge_workouts::routes::create_router;
use fitforge_workouts::services::{AnalyticsAggregator, WorkoutService};
use fitforge_workouts::AppState;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub const USER_ID: &str = "user-1";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", ChangeFeed::new())
        .await
        .expect("Failed to connect to Firestore emulator")
}

#[allow(dead_code)]
pub fn exercise(id: &str, name: &str, workout_type: &str) -> Exercise {
    Exercise {
        id: id.to_string(),
        name: name.to_string(),
        workout_type: workout_type.to_string(),
        primary_muscles: vec!["chest".to_string()],
        secondary_muscles: vec![],
        equipment: Some("barbell".to_string()),
        difficulty: Some("intermediate".to_string()),
        instructions: None,
    }
}

/// In-memory database with a small catalog.
#[allow(dead_code)]
pub fn seeded_db() -> InMemoryDb {
    let db = InMemoryDb::new(ChangeFeed::new());
    db.insert_exercise(exercise("bench-press", "Bench Press", "strength"));
    db.insert_exercise(exercise("squat", "Back Squat", "strength"));
    db.insert_exercise(exercise("deadlift", "Deadlift", "strength"));
    db.insert_exercise(exercise("rowing", "Rowing Machine", "cardio"));
    db
}

/// Aggregator double that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingAnalytics {
    pub calls: Mutex<Vec<String>>,
    pub fail_daily: bool,
    pub failing_goals: HashSet<String>,
}

#[allow(dead_code)]
impl RecordingAnalytics {
    pub fn failing() -> Self {
        Self {
            fail_daily: true,
            ..Self::default()
        }
    }

    pub fn failing_goal(goal_id: &str) -> Self {
        Self {
            failing_goals: HashSet::from([goal_id.to_string()]),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsAggregator for RecordingAnalytics {
    async fn aggregate_daily_analytics(&self, session_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("daily:{}", session_id));
        if self.fail_daily {
            return Err(AppError::Analytics("aggregator down".to_string()));
        }
        Ok(())
    }

    async fn update_goal_progress(&self, goal_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("goal:{}", goal_id));
        if self.failing_goals.contains(goal_id) {
            return Err(AppError::Analytics(format!("goal {} rejected", goal_id)));
        }
        Ok(())
    }
}

/// Service over a seeded in-memory database.
#[allow(dead_code)]
pub fn test_service_with(
    analytics: RecordingAnalytics,
) -> (WorkoutService, InMemoryDb, Arc<RecordingAnalytics>) {
    let db = seeded_db();
    let analytics = Arc::new(analytics);
    let service = WorkoutService::new(Arc::new(db.clone()), analytics.clone());
    (service, db, analytics)
}

#[allow(dead_code)]
pub fn test_service() -> (WorkoutService, InMemoryDb, Arc<RecordingAnalytics>) {
    test_service_with(RecordingAnalytics::default())
}

/// Create a test app over a seeded in-memory database.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, InMemoryDb) {
    let (service, db, _) = test_service();
    let state = Arc::new(AppState {
        config: Config::test_default(),
        service,
    });
    (create_router(state.clone()), state, db)
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    fitforge_workouts::middleware::auth::create_jwt(user_id, signing_key)
        .expect("Failed to create test JWT")
}
