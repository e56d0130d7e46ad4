// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Row-change feed and cancellable subscriptions.
//!
//! Every repository write publishes a [`RowChange`] on the shared
//! [`ChangeFeed`]. Subscribers receive only the changes matching their
//! [`ChangeFilter`], either by pulling with [`Subscription::next`], as a
//! stream, or through a callback whose [`SubscriptionHandle`] stops delivery
//! when cancelled or dropped.

use crate::models::{PersonalRecord, WorkoutExercise, WorkoutSession, WorkoutSet};
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Buffered changes per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 1024;

/// Tables that publish row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    WorkoutSessions,
    WorkoutExercises,
    WorkoutSets,
    PersonalRecords,
}

/// A changed row, tagged by table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Row {
    WorkoutSessions(WorkoutSession),
    WorkoutExercises(WorkoutExercise),
    WorkoutSets(WorkoutSet),
    PersonalRecords(PersonalRecord),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::WorkoutSessions(_) => Table::WorkoutSessions,
            Row::WorkoutExercises(_) => Table::WorkoutExercises,
            Row::WorkoutSets(_) => Table::WorkoutSets,
            Row::PersonalRecords(_) => Table::PersonalRecords,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Row::WorkoutSessions(r) => &r.id,
            Row::WorkoutExercises(r) => &r.id,
            Row::WorkoutSets(r) => &r.id,
            Row::PersonalRecords(r) => &r.id,
        }
    }

    /// Session the row belongs to, if any.
    fn session_id(&self) -> Option<&str> {
        match self {
            Row::WorkoutSessions(r) => Some(&r.id),
            Row::WorkoutExercises(r) => Some(&r.session_id),
            Row::WorkoutSets(r) => Some(&r.session_id),
            Row::PersonalRecords(_) => None,
        }
    }

    /// User owning the row, if stored on it.
    fn user_id(&self) -> Option<&str> {
        match self {
            Row::WorkoutSessions(r) => Some(&r.user_id),
            Row::WorkoutExercises(_) => None,
            Row::WorkoutSets(r) => Some(&r.user_id),
            Row::PersonalRecords(r) => Some(&r.user_id),
        }
    }
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RowChange {
    Inserted { row: Row },
    Updated { row: Row },
    Deleted { table: Table, id: String },
}

impl RowChange {
    pub fn table(&self) -> Table {
        match self {
            RowChange::Inserted { row } | RowChange::Updated { row } => row.table(),
            RowChange::Deleted { table, .. } => *table,
        }
    }

    /// Event name used on the wire (SSE `event:` field).
    pub fn kind(&self) -> &'static str {
        match self {
            RowChange::Inserted { .. } => "inserted",
            RowChange::Updated { .. } => "updated",
            RowChange::Deleted { .. } => "deleted",
        }
    }

    fn row(&self) -> Option<&Row> {
        match self {
            RowChange::Inserted { row } | RowChange::Updated { row } => Some(row),
            RowChange::Deleted { .. } => None,
        }
    }
}

/// Row predicate applied after the table check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPredicate {
    Any,
    /// Rows belonging to a session (the session row itself included)
    Session(String),
    /// Rows owned by a user
    User(String),
}

/// Which changes a subscription wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    tables: Vec<Table>,
    predicate: RowPredicate,
}

impl ChangeFilter {
    pub fn new(tables: impl IntoIterator<Item = Table>, predicate: RowPredicate) -> Self {
        Self {
            tables: tables.into_iter().collect(),
            predicate,
        }
    }

    /// Session row, its per-exercise rows and its sets.
    pub fn workout_session(session_id: &str) -> Self {
        Self::new(
            [Table::WorkoutSessions, Table::WorkoutExercises, Table::WorkoutSets],
            RowPredicate::Session(session_id.to_string()),
        )
    }

    /// Personal records of a user.
    pub fn personal_records(user_id: &str) -> Self {
        Self::new(
            [Table::PersonalRecords],
            RowPredicate::User(user_id.to_string()),
        )
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        if !self.tables.contains(&change.table()) {
            return false;
        }

        match (&self.predicate, change) {
            (RowPredicate::Any, _) => true,
            // Deletes only carry an id; a session filter still matches its own row.
            (RowPredicate::Session(id), RowChange::Deleted { table, id: row_id }) => {
                *table == Table::WorkoutSessions && row_id == id
            }
            (RowPredicate::User(_), RowChange::Deleted { .. }) => false,
            (RowPredicate::Session(id), change) => change
                .row()
                .and_then(Row::session_id)
                .is_some_and(|s| s == id),
            (RowPredicate::User(id), change) => {
                change.row().and_then(Row::user_id).is_some_and(|u| u == id)
            }
        }
    }
}

/// Publisher side of the change feed. Cheap to clone.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RowChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: RowChange) {
        let table = change.table();
        let kind = change.kind();
        let receivers = self.sender.send(change).unwrap_or(0);
        tracing::trace!(?table, kind, receivers, "Published row change");
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of a filtered subscription.
pub struct Subscription {
    receiver: broadcast::Receiver<RowChange>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Next matching change, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<RowChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if self.filter.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<RowChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) if self.filter.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, changes dropped");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = RowChange> + Send + 'static {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|change| (change, sub))
        })
    }

    /// Deliver every matching change to `callback` on a background task.
    pub fn for_each<F>(mut self, callback: F) -> SubscriptionHandle
    where
        F: Fn(RowChange) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(change) = self.next().await {
                callback(change);
            }
        });
        SubscriptionHandle { task }
    }
}

/// Handle to a callback subscription. Dropping it cancels delivery.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
