// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise catalog routes.

use crate::error::Result;
use crate::middleware::auth::Caller;
use crate::models::Exercise;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/exercises", get(list_exercises))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExercisesQuery {
    /// Restrict to one workout type
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50))]
    pub workout_type: Option<String>,
}

async fn list_exercises(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<ExercisesQuery>,
) -> Result<Json<Vec<Exercise>>> {
    params.validate()?;
    let exercises = match params.workout_type.as_deref() {
        Some(workout_type) => {
            state
                .service
                .get_exercises_by_type(&caller, workout_type)
                .await?
        }
        None => state.service.get_all_exercises(&caller).await?,
    };
    Ok(Json(exercises))
}
