// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user history and personal record routes.

use crate::error::Result;
use crate::middleware::auth::Caller;
use crate::models::{PersonalRecord, WorkoutSession};
use crate::routes::change_events;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{user_id}/workouts", get(get_history))
        .route(
            "/api/users/{user_id}/personal-records",
            get(get_personal_records),
        )
        .route(
            "/api/users/{user_id}/personal-records/events",
            get(personal_record_events),
        )
}

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordsQuery {
    #[validate(length(min = 1, max = 128))]
    pub exercise_id: Option<String>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<WorkoutSession>>> {
    params.validate()?;
    let sessions = state
        .service
        .get_workout_history(&caller, &user_id, params.limit)
        .await?;
    Ok(Json(sessions))
}

async fn get_personal_records(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Query(params): Query<RecordsQuery>,
) -> Result<Json<Vec<PersonalRecord>>> {
    params.validate()?;
    let records = state
        .service
        .get_personal_records(&caller, &user_id, params.exercise_id.as_deref())
        .await?;
    Ok(Json(records))
}

/// New and updated personal records, as Server-Sent Events.
async fn personal_record_events(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let subscription = state
        .service
        .subscribe_to_personal_records(&caller, &user_id)
        .await?;
    Ok(change_events(subscription))
}
