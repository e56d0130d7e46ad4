// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout session routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::Caller;
use crate::models::WorkoutSession;
use crate::routes::change_events;
use crate::services::workout::{
    CompleteWorkoutRequest, LogSetRequest, LoggedSet, StartedWorkout, WorkoutSessionDetail,
};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/workouts", post(start_workout))
        .route("/api/workouts/{id}", get(get_workout))
        .route("/api/workouts/{id}/sets", post(log_set))
        .route("/api/workouts/{id}/complete", post(complete_workout))
        .route("/api/workouts/{id}/cancel", post(cancel_workout))
        .route("/api/workouts/{id}/events", get(workout_events))
}

/// Body for starting a workout.
#[derive(Debug, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartWorkoutRequest {
    #[validate(length(min = 1, max = 50))]
    pub workout_type: String,
    #[validate(length(max = 50))]
    pub exercise_ids: Vec<String>,
    #[validate(length(max = 100))]
    pub session_name: Option<String>,
}

async fn start_workout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<StartWorkoutRequest>,
) -> Result<(StatusCode, Json<StartedWorkout>)> {
    body.validate()?;

    let started = state
        .service
        .start_workout(
            &caller,
            &body.workout_type,
            &body.exercise_ids,
            body.session_name,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(started)))
}

async fn get_workout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<WorkoutSessionDetail>> {
    state
        .service
        .get_workout_session(&caller, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Workout session {} not found", id)))
}

async fn log_set(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<LogSetRequest>,
) -> Result<(StatusCode, Json<LoggedSet>)> {
    let logged = state.service.log_set(&caller, &id, body).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

async fn complete_workout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Option<Json<CompleteWorkoutRequest>>,
) -> Result<Json<WorkoutSession>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let session = state
        .service
        .complete_workout(&caller, &id, request)
        .await?;
    Ok(Json(session))
}

async fn cancel_workout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<WorkoutSession>> {
    let session = state.service.cancel_workout(&caller, &id).await?;
    Ok(Json(session))
}

/// Row changes for one session, as Server-Sent Events.
async fn workout_events(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let subscription = state
        .service
        .subscribe_to_workout_session(&caller, &id)
        .await?;
    Ok(change_events(subscription))
}
