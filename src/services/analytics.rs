// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Post-workout analytics side-calls.
//!
//! After a workout completes, the daily analytics aggregate and the
//! progress of every active goal are refreshed by an external aggregator.
//! This runs as a detached job: the caller never waits on it, and failures
//! are logged and kept in a dead-letter log instead of being propagated.

use crate::db::WorkoutRepository;
use crate::error::{AppError, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Failed steps kept before the oldest are dropped.
pub const MAX_DEAD_LETTERS: usize = 1000;

/// External analytics collaborator.
#[async_trait]
pub trait AnalyticsAggregator: Send + Sync {
    async fn aggregate_daily_analytics(&self, session_id: &str) -> Result<()>;

    async fn update_goal_progress(&self, goal_id: &str) -> Result<()>;
}

/// Aggregator reached over HTTP.
#[derive(Clone)]
pub struct HttpAnalyticsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAnalyticsClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building analytics HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Analytics(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl AnalyticsAggregator for HttpAnalyticsClient {
    async fn aggregate_daily_analytics(&self, session_id: &str) -> Result<()> {
        let url = format!("{}/analytics/daily", self.base_url);
        let body = serde_json::json!({ "session_id": session_id });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Analytics(e.to_string()))?;

        self.check_response(response).await
    }

    async fn update_goal_progress(&self, goal_id: &str) -> Result<()> {
        let url = format!("{}/goals/{}/progress", self.base_url, goal_id);

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| AppError::Analytics(e.to_string()))?;

        self.check_response(response).await
    }
}

/// Aggregator used when no analytics endpoint is configured.
#[derive(Clone, Copy, Default)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsAggregator for NoopAnalytics {
    async fn aggregate_daily_analytics(&self, session_id: &str) -> Result<()> {
        tracing::debug!(session_id, "Analytics disabled, skipping daily aggregation");
        Ok(())
    }

    async fn update_goal_progress(&self, goal_id: &str) -> Result<()> {
        tracing::debug!(goal_id, "Analytics disabled, skipping goal progress");
        Ok(())
    }
}

/// Work queued after a workout completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsJob {
    pub session_id: String,
    pub user_id: String,
}

/// Step of a job that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FailedStep {
    DailyAggregation,
    LoadGoals,
    GoalProgress { goal_id: String },
}

/// A failed step, kept for inspection or replay.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub job: AnalyticsJob,
    #[serde(flatten)]
    pub step: FailedStep,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Failure channel for background analytics jobs.
///
/// Bounded: once `capacity` entries are held, recording a new failure drops
/// the oldest one.
#[derive(Clone)]
pub struct DeadLetterLog {
    entries: Arc<Mutex<VecDeque<DeadLetter>>>,
    capacity: usize,
}

impl Default for DeadLetterLog {
    fn default() -> Self {
        Self::with_capacity(MAX_DEAD_LETTERS)
    }
}

impl DeadLetterLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DeadLetter>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, job: &AnalyticsJob, step: FailedStep, error: &AppError) {
        tracing::warn!(
            session_id = %job.session_id,
            user_id = %job.user_id,
            ?step,
            error = %error,
            "Analytics job step failed"
        );
        let entry = DeadLetter {
            job: job.clone(),
            step,
            error: error.to_string(),
            failed_at: Utc::now(),
        };

        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                tracing::warn!(
                    session_id = %dropped.job.session_id,
                    step = ?dropped.step,
                    failed_at = %dropped.failed_at,
                    capacity = self.capacity,
                    "Dead-letter log full, dropping oldest entry"
                );
            }
        }
        entries.push_back(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.lock().iter().cloned().collect()
    }

    /// Take every held entry, oldest first, leaving the log empty.
    pub fn drain(&self) -> Vec<DeadLetter> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs analytics jobs on detached tasks.
#[derive(Clone)]
pub struct AnalyticsDispatcher {
    aggregator: Arc<dyn AnalyticsAggregator>,
    repo: Arc<dyn WorkoutRepository>,
    dead_letters: DeadLetterLog,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl AnalyticsDispatcher {
    pub fn new(aggregator: Arc<dyn AnalyticsAggregator>, repo: Arc<dyn WorkoutRepository>) -> Self {
        Self {
            aggregator,
            repo,
            dead_letters: DeadLetterLog::default(),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn dead_letters(&self) -> &DeadLetterLog {
        &self.dead_letters
    }

    /// Queue a job. Returns immediately; the outcome is only visible in the logs
    /// and the dead-letter log.
    pub fn dispatch(&self, job: AnalyticsJob) {
        tracing::debug!(session_id = %job.session_id, "Dispatching analytics job");

        let aggregator = self.aggregator.clone();
        let repo = self.repo.clone();
        let dead_letters = self.dead_letters.clone();

        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Reap finished jobs so the set doesn't grow without bound.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(run_job(job, aggregator, repo, dead_letters));
    }

    /// Wait until every dispatched job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let mut jobs = {
                let mut guard = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *guard)
            };
            if jobs.is_empty() {
                return;
            }
            while let Some(result) = jobs.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Analytics job panicked");
                }
            }
        }
    }

    /// Like [`wait_idle`](Self::wait_idle), but gives up after `limit`.
    ///
    /// Returns `false` on timeout; jobs still running at that point are aborted.
    pub async fn wait_idle_for(&self, limit: Duration) -> bool {
        if tokio::time::timeout(limit, self.wait_idle()).await.is_ok() {
            return true;
        }
        tracing::warn!(
            timeout_ms = limit.as_millis() as u64,
            "Analytics jobs still running, abandoning them"
        );
        false
    }
}

async fn run_job(
    job: AnalyticsJob,
    aggregator: Arc<dyn AnalyticsAggregator>,
    repo: Arc<dyn WorkoutRepository>,
    dead_letters: DeadLetterLog,
) {
    if let Err(e) = aggregator.aggregate_daily_analytics(&job.session_id).await {
        dead_letters.record(&job, FailedStep::DailyAggregation, &e);
    }

    let goals = match repo.get_active_goals(&job.user_id).await {
        Ok(goals) => goals,
        Err(e) => {
            dead_letters.record(&job, FailedStep::LoadGoals, &e);
            return;
        }
    };

    for goal in &goals {
        if let Err(e) = aggregator.update_goal_progress(&goal.id).await {
            dead_letters.record(
                &job,
                FailedStep::GoalProgress {
                    goal_id: goal.id.clone(),
                },
                &e,
            );
        }
    }

    tracing::info!(
        session_id = %job.session_id,
        goals = goals.len(),
        "Analytics job finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(session_id: &str) -> AnalyticsJob {
        AnalyticsJob {
            session_id: session_id.to_string(),
            user_id: "u-1".to_string(),
        }
    }

    #[test]
    fn test_dead_letter_log_drops_oldest_when_full() {
        let log = DeadLetterLog::with_capacity(2);
        let error = AppError::Analytics("down".to_string());

        for id in ["s-1", "s-2", "s-3"] {
            log.record(&job(id), FailedStep::DailyAggregation, &error);
        }

        let sessions: Vec<String> = log.entries().into_iter().map(|d| d.job.session_id).collect();
        assert_eq!(sessions, vec!["s-2", "s-3"]);
    }

    #[test]
    fn test_dead_letter_drain_empties_log() {
        let log = DeadLetterLog::default();
        let error = AppError::Analytics("down".to_string());
        log.record(&job("s-1"), FailedStep::LoadGoals, &error);
        log.record(&job("s-2"), FailedStep::DailyAggregation, &error);

        let drained = log.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].step, FailedStep::LoadGoals);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_http_client_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client =
            HttpAnalyticsClient::with_timeout(format!("http://{}", addr), Duration::from_millis(200))
                .unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.aggregate_daily_analytics("s-1"),
        )
        .await
        .expect("request should be bounded by the client timeout");

        assert!(matches!(result, Err(AppError::Analytics(_))));
    }
}
