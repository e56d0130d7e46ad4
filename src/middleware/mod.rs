// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (caller resolution).

pub mod auth;

pub use auth::resolve_caller;
