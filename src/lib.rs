// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FitForge workouts: workout session tracking over a hosted backend.
//!
//! This crate provides the workout service (sessions, sets, history,
//! personal records), its Firestore-backed repository, a realtime
//! row-change feed and the HTTP API exposing them.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;

use config::Config;
use services::WorkoutService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub service: WorkoutService,
}
