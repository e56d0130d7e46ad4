// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout service behaviour over the in-memory repository.

use fitforge_workouts::db::WorkoutRepository;
use fitforge_workouts::error::AppError;
use fitforge_workouts::middleware::auth::Caller;
use fitforge_workouts::models::{
    PersonalRecord, RecordType, WorkoutSession, WorkoutStatus,
};
use fitforge_workouts::services::{CompleteWorkoutRequest, LogSetRequest};
use chrono::{Duration, Utc};

mod common;
use common::{test_service, USER_ID};

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn set(exercise_id: &str, set_number: u32, reps: u32, weight: f64) -> LogSetRequest {
    LogSetRequest {
        exercise_id: exercise_id.to_string(),
        set_number,
        reps,
        weight,
        form_score: None,
        perceived_exertion: Some(8),
        equipment: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// START
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_start_creates_one_row_per_exercise_in_order() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);

    let started = service
        .start_workout(
            &caller,
            "strength",
            &ids(&["squat", "bench-press", "deadlift"]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(started.session.status, WorkoutStatus::InProgress);
    assert_eq!(started.session.total_volume, 0.0);
    assert_eq!(started.session.session_name, "Strength Workout");
    assert_eq!(started.session.user_id, USER_ID);

    let order: Vec<(u32, &str)> = started
        .exercises
        .iter()
        .map(|e| (e.workout_exercise.order_index, e.exercise.id.as_str()))
        .collect();
    assert_eq!(order, vec![(1, "squat"), (2, "bench-press"), (3, "deadlift")]);
    assert!(started
        .exercises
        .iter()
        .all(|e| e.workout_exercise.rest_seconds == 60));

    let stored = db.get_workout_exercises(&started.session.id).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].exercise_id, "squat");
}

#[tokio::test]
async fn test_start_keeps_custom_name() {
    let (service, _, _) = test_service();
    let started = service
        .start_workout(
            &Caller::user(USER_ID),
            "strength",
            &ids(&["squat"]),
            Some("Leg Day".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(started.session.session_name, "Leg Day");
}

#[tokio::test]
async fn test_start_with_unknown_exercise_writes_nothing() {
    let (service, db, _) = test_service();

    let err = service
        .start_workout(
            &Caller::user(USER_ID),
            "strength",
            &ids(&["squat", "does-not-exist"]),
            None,
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(db.session_count(), 0);
}

#[tokio::test]
async fn test_start_rejects_duplicate_exercises() {
    let (service, db, _) = test_service();

    let err = service
        .start_workout(
            &Caller::user(USER_ID),
            "strength",
            &ids(&["squat", "squat"]),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(db.session_count(), 0);
}

#[tokio::test]
async fn test_every_operation_requires_a_caller() {
    let (service, _, _) = test_service();
    let anonymous = Caller::anonymous();

    let started = service
        .start_workout(&Caller::user(USER_ID), "strength", &ids(&["squat"]), None)
        .await
        .unwrap();
    let session_id = started.session.id.as_str();

    assert!(matches!(
        service
            .start_workout(&anonymous, "strength", &ids(&["squat"]), None)
            .await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service
            .log_set(&anonymous, session_id, set("squat", 1, 5, 100.0))
            .await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service
            .complete_workout(&anonymous, session_id, CompleteWorkoutRequest::default())
            .await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.cancel_workout(&anonymous, session_id).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.get_workout_session(&anonymous, session_id).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.get_workout_history(&anonymous, USER_ID, None).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.get_personal_records(&anonymous, USER_ID, None).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.get_exercises_by_type(&anonymous, "strength").await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service.get_all_exercises(&anonymous).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service
            .subscribe_to_workout_session(&anonymous, session_id)
            .await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        service
            .subscribe_to_personal_records(&anonymous, USER_ID)
            .await,
        Err(AppError::Unauthenticated)
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// LOG SET
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_log_set_adds_exact_volume() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press", "squat"]), None)
        .await
        .unwrap();
    let session_id = started.session.id.as_str();

    service
        .log_set(&caller, session_id, set("squat", 1, 8, 60.0))
        .await
        .unwrap();
    let before = db
        .get_workout_session(session_id)
        .await
        .unwrap()
        .unwrap()
        .total_volume;

    let logged = service
        .log_set(&caller, session_id, set("bench-press", 1, 5, 100.0))
        .await
        .unwrap();

    let after = db
        .get_workout_session(session_id)
        .await
        .unwrap()
        .unwrap()
        .total_volume;

    assert_eq!(after - before, 500.0);
    assert_eq!(logged.session_volume, after);
    assert_eq!(logged.exercise_volume, 500.0);
    assert_eq!(logged.exercise_completed_sets, 1);
    assert!(logged.set.completed);
    assert!(!logged.set.is_personal_record);
}

#[tokio::test]
async fn test_exercise_totals_agree_with_session_total() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press", "squat"]), None)
        .await
        .unwrap();
    let session_id = started.session.id.as_str();

    for (n, (exercise, reps, weight)) in [
        ("bench-press", 5, 100.0),
        ("bench-press", 5, 102.5),
        ("squat", 3, 140.0),
    ]
    .into_iter()
    .enumerate()
    {
        service
            .log_set(&caller, session_id, set(exercise, n as u32 + 1, reps, weight))
            .await
            .unwrap();
    }

    let session = db.get_workout_session(session_id).await.unwrap().unwrap();
    let rows = db.get_workout_exercises(session_id).await.unwrap();

    let per_exercise: f64 = rows.iter().map(|r| r.total_volume).sum();
    assert_eq!(session.total_volume, 500.0 + 512.5 + 420.0);
    assert_eq!(per_exercise, session.total_volume);

    let bench = rows.iter().find(|r| r.exercise_id == "bench-press").unwrap();
    assert_eq!(bench.completed_sets, 2);
    assert!(bench.started_at.is_some());
}

#[tokio::test]
async fn test_log_set_for_exercise_not_in_session_writes_nothing() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press"]), None)
        .await
        .unwrap();
    let mut sub = service
        .subscribe_to_workout_session(&caller, &started.session.id)
        .await
        .unwrap();

    let err = service
        .log_set(&caller, &started.session.id, set("deadlift", 1, 5, 100.0))
        .await
        .unwrap_err();

    match err {
        AppError::NotFound(msg) => assert_eq!(msg, AppError::EXERCISE_NOT_IN_WORKOUT),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert_eq!(db.set_count(), 0);
    assert!(sub.try_next().is_none(), "no row changes expected");
}

#[tokio::test]
async fn test_log_set_validation_rejected() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press"]), None)
        .await
        .unwrap();

    let mut request = set("bench-press", 1, 5, 100.0);
    request.perceived_exertion = Some(12);

    let err = service
        .log_set(&caller, &started.session.id, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(db.set_count(), 0);
}

#[tokio::test]
async fn test_log_set_on_finished_session_rejected() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press"]), None)
        .await
        .unwrap();
    service
        .cancel_workout(&caller, &started.session.id)
        .await
        .unwrap();

    let err = service
        .log_set(&caller, &started.session.id, set("bench-press", 1, 5, 100.0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(db.set_count(), 0);
}

#[tokio::test]
async fn test_other_users_session_is_not_found() {
    let (service, _, _) = test_service();
    let started = service
        .start_workout(&Caller::user(USER_ID), "strength", &ids(&["squat"]), None)
        .await
        .unwrap();
    let intruder = Caller::user("someone-else");

    let err = service
        .log_set(&intruder, &started.session.id, set("squat", 1, 5, 100.0))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let detail = service
        .get_workout_session(&intruder, &started.session.id)
        .await
        .unwrap();
    assert!(detail.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPLETE / CANCEL
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_complete_sets_status_and_duration() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press", "squat"]), None)
        .await
        .unwrap();

    // Backdate the start so the duration is measurable.
    let mut session = started.session.clone();
    session.started_at = Utc::now() - Duration::seconds(45 * 60 + 30);
    db.update_workout_session(&session).await.unwrap();

    let completed = service
        .complete_workout(
            &caller,
            &session.id,
            CompleteWorkoutRequest {
                rating: Some(4),
                notes: Some("Felt strong".to_string()),
            },
        )
        .await
        .unwrap();

    let ended_at = completed.ended_at.expect("end time set");
    assert_eq!(completed.status, WorkoutStatus::Completed);
    assert!(ended_at >= completed.started_at);
    let expected = ((ended_at - completed.started_at).num_seconds() / 60) as u32;
    assert_eq!(completed.duration_minutes, Some(expected));
    assert_eq!(expected, 45);
    assert_eq!(completed.rating, Some(4));
    assert_eq!(completed.notes.as_deref(), Some("Felt strong"));

    let rows = db.get_workout_exercises(&session.id).await.unwrap();
    assert!(rows.iter().all(|r| r.completed_at == Some(ended_at)));

    service.analytics().wait_idle().await;
}

#[tokio::test]
async fn test_complete_twice_rejected() {
    let (service, _, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["squat"]), None)
        .await
        .unwrap();

    service
        .complete_workout(&caller, &started.session.id, CompleteWorkoutRequest::default())
        .await
        .unwrap();
    let err = service
        .complete_workout(&caller, &started.session.id, CompleteWorkoutRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    service.analytics().wait_idle().await;
}

#[tokio::test]
async fn test_cancel_leaves_volume_unchanged() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["bench-press"]), None)
        .await
        .unwrap();
    service
        .log_set(&caller, &started.session.id, set("bench-press", 1, 10, 60.0))
        .await
        .unwrap();

    let cancelled = service
        .cancel_workout(&caller, &started.session.id)
        .await
        .unwrap();

    assert_eq!(cancelled.status, WorkoutStatus::Cancelled);
    assert_eq!(cancelled.total_volume, 600.0);
    assert!(cancelled.ended_at.is_some());
    assert!(cancelled.duration_minutes.is_none());

    let stored = db
        .get_workout_session(&started.session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_volume, 600.0);
    assert_eq!(stored.status, WorkoutStatus::Cancelled);
}

// ═══════════════════════════════════════════════════════════════════════════
// READS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_get_unknown_session_is_none() {
    let (service, _, _) = test_service();
    let detail = service
        .get_workout_session(&Caller::user(USER_ID), "no-such-session")
        .await
        .unwrap();
    assert!(detail.is_none());
}

#[tokio::test]
async fn test_get_session_nests_exercises_and_sets() {
    let (service, _, _) = test_service();
    let caller = Caller::user(USER_ID);
    let started = service
        .start_workout(&caller, "strength", &ids(&["squat", "bench-press"]), None)
        .await
        .unwrap();
    let session_id = started.session.id.as_str();

    service
        .log_set(&caller, session_id, set("squat", 2, 5, 120.0))
        .await
        .unwrap();
    service
        .log_set(&caller, session_id, set("squat", 1, 5, 110.0))
        .await
        .unwrap();

    let detail = service
        .get_workout_session(&caller, session_id)
        .await
        .unwrap()
        .expect("session exists");

    assert_eq!(detail.session.id, session_id);
    assert_eq!(detail.exercises.len(), 2);

    let squat = &detail.exercises[0];
    assert_eq!(squat.exercise.as_ref().unwrap().name, "Back Squat");
    let numbers: Vec<u32> = squat.sets.iter().map(|s| s.set_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert!(detail.exercises[1].sets.is_empty());
}

#[tokio::test]
async fn test_history_limit_and_ownership() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);

    for minutes_ago in 0..25 {
        let session = WorkoutSession::start(
            USER_ID,
            "strength",
            None,
            Utc::now() - Duration::minutes(minutes_ago),
        );
        db.create_workout_session(&session).await.unwrap();
    }

    let default = service
        .get_workout_history(&caller, USER_ID, None)
        .await
        .unwrap();
    assert_eq!(default.len(), 20);
    assert!(default.windows(2).all(|w| w[0].started_at >= w[1].started_at));

    let five = service
        .get_workout_history(&caller, USER_ID, Some(5))
        .await
        .unwrap();
    assert_eq!(five.len(), 5);

    let err = service
        .get_workout_history(&caller, "someone-else", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn test_personal_records_filter_by_exercise() {
    let (service, db, _) = test_service();
    let caller = Caller::user(USER_ID);

    for (id, exercise_id) in [("pr-1", "squat"), ("pr-2", "bench-press")] {
        db.insert_personal_record(PersonalRecord {
            id: id.to_string(),
            user_id: USER_ID.to_string(),
            exercise_id: exercise_id.to_string(),
            record_type: RecordType::MaxWeight,
            value: 150.0,
            workout_set_id: None,
            achieved_at: Utc::now(),
        });
    }

    let all = service
        .get_personal_records(&caller, USER_ID, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let squat = service
        .get_personal_records(&caller, USER_ID, Some("squat"))
        .await
        .unwrap();
    assert_eq!(squat.len(), 1);
    assert_eq!(squat[0].id, "pr-1");
}

#[tokio::test]
async fn test_exercise_catalog_reads() {
    let (service, _, _) = test_service();
    let caller = Caller::user(USER_ID);

    let all = service.get_all_exercises(&caller).await.unwrap();
    assert_eq!(all.len(), 4);
    let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Back Squat", "Bench Press", "Deadlift", "Rowing Machine"]
    );

    let cardio = service
        .get_exercises_by_type(&caller, "cardio")
        .await
        .unwrap();
    assert_eq!(cardio.len(), 1);
    assert_eq!(cardio[0].id, "rowing");
}

#[tokio::test]
async fn test_backend_errors_propagate_unchanged() {
    let (service, db, _) = test_service();
    db.set_unavailable(true);

    let err = service
        .get_all_exercises(&Caller::user(USER_ID))
        .await
        .unwrap_err();

    match err {
        AppError::Database(msg) => assert_eq!(msg, "Backend unavailable"),
        other => panic!("expected Database error, got {:?}", other),
    }
}
