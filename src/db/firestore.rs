// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing the workout repository.
//!
//! Provides typed operations for:
//! - Workout sessions, per-exercise rows and sets
//! - The exercise catalog (read-only for the service)
//! - Personal records and goals (maintained by the backend)

use crate::db::{collections, ensure_in_progress, session_not_found, WorkoutRepository};
use crate::error::AppError;
use crate::models::{
    Exercise, Goal, GoalStatus, PersonalRecord, SessionFinish, SetTotals, WorkoutExercise,
    WorkoutSession, WorkoutSet, WorkoutStatus,
};
use crate::realtime::{ChangeFeed, Row, RowChange};
use async_trait::async_trait;
use firestore::{FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreTransaction};
use serde::Serialize;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    changes: ChangeFeed,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, changes: ChangeFeed) -> Result<Self, AppError> {
        // The emulator doesn't need credentials; skip the token lookup entirely.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, changes).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            changes,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        changes: ChangeFeed,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            changes,
        })
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_offline() -> Self {
        Self {
            client: None,
            changes: ChangeFeed::new(),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Write a whole document, creating it if missing.
    async fn put<T>(&self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send + for<'de> serde::Deserialize<'de>,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_by_id<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> serde::Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Transactions ────────────────────────────────────────────

    async fn begin_transaction(&self) -> Result<FirestoreTransaction<'_>, AppError> {
        self.get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Client whose reads are part of `transaction`, so a concurrent write to
    /// any document read through it makes the commit fail.
    fn transaction_reader(
        &self,
        transaction: &FirestoreTransaction<'_>,
    ) -> Result<firestore::FirestoreDb, AppError> {
        Ok(self
            .get_client()?
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            )))
    }

    /// Add a whole-document write to `transaction`.
    fn stage<T>(
        &self,
        transaction: &mut FirestoreTransaction<'_>,
        collection: &str,
        id: &str,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send + for<'de> serde::Deserialize<'de>,
    {
        self.get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} write to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    async fn commit(transaction: FirestoreTransaction<'_>) -> Result<(), AppError> {
        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }

    // ─── Catalog & goal seeding ──────────────────────────────────

    /// Create or replace a catalog entry.
    pub async fn upsert_exercise(&self, exercise: &Exercise) -> Result<(), AppError> {
        self.put(collections::EXERCISES, &exercise.id, exercise)
            .await
    }

    /// Create or replace a goal.
    pub async fn upsert_goal(&self, goal: &Goal) -> Result<(), AppError> {
        self.put(collections::USER_GOALS, &goal.id, goal).await
    }
}

#[async_trait]
impl WorkoutRepository for FirestoreDb {
    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    // ─── Session Operations ──────────────────────────────────────

    async fn create_workout_session(&self, session: &WorkoutSession) -> Result<(), AppError> {
        self.put(collections::WORKOUT_SESSIONS, &session.id, session)
            .await?;
        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutSessions(session.clone()),
        });
        Ok(())
    }

    async fn get_workout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<WorkoutSession>, AppError> {
        self.get_by_id(collections::WORKOUT_SESSIONS, session_id)
            .await
    }

    async fn update_workout_session(&self, session: &WorkoutSession) -> Result<(), AppError> {
        self.put(collections::WORKOUT_SESSIONS, &session.id, session)
            .await?;
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session.clone()),
        });
        Ok(())
    }

    async fn finish_workout_session(
        &self,
        session_id: &str,
        finish: &SessionFinish,
    ) -> Result<WorkoutSession, AppError> {
        let mut transaction = self.begin_transaction().await?;
        let reader = self.transaction_reader(&transaction)?;

        let staged: Result<(WorkoutSession, Vec<WorkoutExercise>), AppError> = async {
            let session: Option<WorkoutSession> = reader
                .fluent()
                .select()
                .by_id_in(collections::WORKOUT_SESSIONS)
                .obj()
                .one(session_id)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            let mut session = session.ok_or_else(|| session_not_found(session_id))?;
            ensure_in_progress(&session)?;
            session.finish(finish);

            let mut stamped = Vec::new();
            if finish.status == WorkoutStatus::Completed {
                let rows: Vec<WorkoutExercise> = reader
                    .fluent()
                    .select()
                    .from(collections::WORKOUT_EXERCISES)
                    .filter(|q| q.for_all([q.field("session_id").eq(session_id)]))
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                stamped = rows
                    .into_iter()
                    .filter(|we| we.completed_at.is_none())
                    .map(|mut we| {
                        we.completed_at = Some(finish.ended_at);
                        we
                    })
                    .collect();
            }
            Ok((session, stamped))
        }
        .await;

        let (session, stamped) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        self.stage(
            &mut transaction,
            collections::WORKOUT_SESSIONS,
            &session.id,
            &session,
        )?;
        for workout_exercise in &stamped {
            self.stage(
                &mut transaction,
                collections::WORKOUT_EXERCISES,
                &workout_exercise.id,
                workout_exercise,
            )?;
        }
        Self::commit(transaction).await?;

        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session.clone()),
        });
        for workout_exercise in stamped {
            self.changes.publish(RowChange::Updated {
                row: Row::WorkoutExercises(workout_exercise),
            });
        }

        tracing::debug!(
            session_id,
            status = session.status.as_str(),
            "Session finished atomically"
        );
        Ok(session)
    }

    async fn get_workout_sessions_for_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<WorkoutSession>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WORKOUT_SESSIONS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .order_by([("started_at", FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Per-Exercise Operations ─────────────────────────────────

    async fn create_workout_exercise(
        &self,
        workout_exercise: &WorkoutExercise,
    ) -> Result<(), AppError> {
        self.put(
            collections::WORKOUT_EXERCISES,
            &workout_exercise.id,
            workout_exercise,
        )
        .await?;
        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutExercises(workout_exercise.clone()),
        });
        Ok(())
    }

    async fn get_workout_exercises(
        &self,
        session_id: &str,
    ) -> Result<Vec<WorkoutExercise>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WORKOUT_EXERCISES)
            .filter(|q| q.for_all([q.field("session_id").eq(session_id)]))
            .order_by([("order_index", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Set Operations ──────────────────────────────────────────

    async fn record_set(&self, set: &WorkoutSet) -> Result<SetTotals, AppError> {
        let mut transaction = self.begin_transaction().await?;
        let reader = self.transaction_reader(&transaction)?;

        let staged: Result<(WorkoutSession, WorkoutExercise, SetTotals), AppError> = async {
            let session: Option<WorkoutSession> = reader
                .fluent()
                .select()
                .by_id_in(collections::WORKOUT_SESSIONS)
                .obj()
                .one(&set.session_id)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            let mut session = session.ok_or_else(|| session_not_found(&set.session_id))?;
            ensure_in_progress(&session)?;

            let workout_exercise: Option<WorkoutExercise> = reader
                .fluent()
                .select()
                .by_id_in(collections::WORKOUT_EXERCISES)
                .obj()
                .one(&set.workout_exercise_id)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            let mut workout_exercise = workout_exercise
                .filter(|we| we.session_id == set.session_id)
                .ok_or_else(|| {
                    AppError::NotFound(AppError::EXERCISE_NOT_IN_WORKOUT.to_string())
                })?;

            // The new set isn't visible to reads in this transaction yet.
            let mut session_sets: Vec<WorkoutSet> = reader
                .fluent()
                .select()
                .from(collections::WORKOUT_SETS)
                .filter(|q| q.for_all([q.field("session_id").eq(set.session_id.as_str())]))
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            session_sets.push(set.clone());

            let totals = SetTotals::from_session_sets(&session_sets, &workout_exercise.id);
            workout_exercise.apply_totals(&totals.exercise, set.created_at);
            session.total_volume = totals.session.total_volume;
            session.updated_at = set.created_at;
            Ok((session, workout_exercise, totals))
        }
        .await;

        let (session, workout_exercise, totals) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        self.stage(&mut transaction, collections::WORKOUT_SETS, &set.id, set)?;
        self.stage(
            &mut transaction,
            collections::WORKOUT_EXERCISES,
            &workout_exercise.id,
            &workout_exercise,
        )?;
        self.stage(
            &mut transaction,
            collections::WORKOUT_SESSIONS,
            &session.id,
            &session,
        )?;
        Self::commit(transaction).await?;

        self.changes.publish(RowChange::Inserted {
            row: Row::WorkoutSets(set.clone()),
        });
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutExercises(workout_exercise),
        });
        self.changes.publish(RowChange::Updated {
            row: Row::WorkoutSessions(session),
        });
        Ok(totals)
    }

    async fn get_workout_sets(
        &self,
        workout_exercise_id: &str,
    ) -> Result<Vec<WorkoutSet>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WORKOUT_SETS)
            .filter(|q| q.for_all([q.field("workout_exercise_id").eq(workout_exercise_id)]))
            .order_by([("set_number", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_session_sets(&self, session_id: &str) -> Result<Vec<WorkoutSet>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WORKOUT_SETS)
            .filter(|q| q.for_all([q.field("session_id").eq(session_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Catalog Operations ──────────────────────────────────────

    async fn get_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>, AppError> {
        self.get_by_id(collections::EXERCISES, exercise_id).await
    }

    async fn get_exercises(&self) -> Result<Vec<Exercise>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISES)
            .order_by([("name", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_exercises_by_workout_type(
        &self,
        workout_type: &str,
    ) -> Result<Vec<Exercise>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISES)
            .filter(|q| q.for_all([q.field("workout_type").eq(workout_type)]))
            .order_by([("name", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Records & Goals ─────────────────────────────────────────

    async fn get_personal_records(
        &self,
        user_id: &str,
        exercise_id: Option<&str>,
    ) -> Result<Vec<PersonalRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PERSONAL_RECORDS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    exercise_id.and_then(|id| q.field("exercise_id").eq(id)),
                ])
            })
            .order_by([("achieved_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_active_goals(&self, user_id: &str) -> Result<Vec<Goal>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_GOALS)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("status").eq(GoalStatus::Active.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
