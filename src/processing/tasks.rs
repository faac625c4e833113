//! In-memory status of background processing units.
//!
//! A task moves PENDING → PROCESSING → COMPLETED or ERROR and never back; the only exception is
//! [`TaskStore::force_complete`], a debugging override. Records live in process memory and are
//! removed only by an age-based sweep.

use crate::clock;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker.
    Pending,
    /// Running.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

impl TaskStatus {
    /// True for COMPLETED and ERROR.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Status record of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Current state.
    pub status: TaskStatus,
    /// Percentage in 0..=100.
    pub progress: u8,
    /// Human-readable description of the current stage.
    pub message: String,
    /// Outcome, once completed.
    pub result: Option<Value>,
    /// Time of the last update (RFC 3339).
    pub timestamp: String,
    #[serde(skip)]
    updated_at: Instant,
}

impl TaskRecord {
    fn new(status: TaskStatus, progress: u8, message: String, result: Option<Value>) -> Self {
        Self {
            status,
            progress,
            message,
            result,
            timestamp: clock::current_timestamp_rfc3339(),
            updated_at: Instant::now(),
        }
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records removed.
    pub removed_tasks: usize,
    /// Records left.
    pub active_tasks: usize,
}

/// Shared map of task records. Clones share the same map.
#[derive(Clone)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
    max_age: Duration,
}

impl TaskStore {
    /// Store whose sweep removes records not updated for `max_age`.
    pub fn new(max_age: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            max_age,
        }
    }

    /// Register a PENDING task at 10% and return its id.
    pub async fn create(&self, message: impl Into<String>) -> String {
        let task_id = Uuid::new_v4().to_string();
        let record = TaskRecord::new(TaskStatus::Pending, 10, message.into(), None);
        tracing::info!(task_id = %task_id, message = %record.message, "Task created");
        self.tasks.write().await.insert(task_id.clone(), record);
        task_id
    }

    /// Move `task_id` forward. Returns false when the task is unknown or already terminal.
    pub async fn update(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
        message: impl Into<String>,
        result: Option<Value>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(record) = tasks.get_mut(task_id) else {
            tracing::warn!(task_id, "Update for unknown task ignored");
            return false;
        };
        if record.status.is_terminal() {
            tracing::warn!(
                task_id,
                current = ?record.status,
                requested = ?status,
                "Task already finished"
            );
            return false;
        }
        *record = TaskRecord::new(status, progress.min(100), message.into(), result);
        match status {
            TaskStatus::Error => {
                tracing::error!(task_id, message = %record.message, "Task failed")
            }
            TaskStatus::Completed => {
                tracing::info!(task_id, message = %record.message, "Task completed")
            }
            _ => tracing::info!(task_id, progress, message = %record.message, "Task progress"),
        }
        true
    }

    /// Record of `task_id`.
    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Every record, keyed by task id.
    pub async fn all(&self) -> BTreeMap<String, TaskRecord> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Number of records currently PROCESSING.
    pub async fn processing_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|record| record.status == TaskStatus::Processing)
            .count()
    }

    /// Remove records not updated within the configured age.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_older_than(self.max_age).await
    }

    /// Remove records not updated within `age`.
    pub async fn sweep_older_than(&self, age: Duration) -> SweepReport {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, record| record.updated_at.elapsed() <= age);
        let report = SweepReport {
            removed_tasks: before - tasks.len(),
            active_tasks: tasks.len(),
        };
        tracing::info!(
            removed = report.removed_tasks,
            active = report.active_tasks,
            "Task sweep finished"
        );
        report
    }

    /// Mark `task_id` COMPLETED at 100% whatever its state.
    pub async fn force_complete(&self, task_id: &str) -> Option<TaskRecord> {
        let mut tasks = self.tasks.write().await;
        let record = tasks.get_mut(task_id)?;
        let result = record.result.take();
        *record = TaskRecord::new(
            TaskStatus::Completed,
            100,
            "Processing forced to completed".to_string(),
            result,
        );
        tracing::warn!(task_id, "Task forced to completed");
        Some(record.clone())
    }
}

/// Render a duration: seconds below a minute, minutes below an hour, hours above.
pub fn format_processing_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.2}s")
    } else if seconds < 3600.0 {
        format!("{:.2}min", seconds / 60.0)
    } else {
        format!("{:.2}h", seconds / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let store = TaskStore::new(Duration::from_secs(3600));
        let id = store.create("Starting contrato.pdf").await;
        let record = store.get(&id).await.unwrap();
        assert_eq!((record.status, record.progress), (TaskStatus::Pending, 10));

        assert!(store.update(&id, TaskStatus::Processing, 20, "Extracting", None).await);
        assert!(store.update(&id, TaskStatus::Error, 0, "boom", None).await);
        assert!(!store.update(&id, TaskStatus::Processing, 50, "again", None).await);

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.message, "boom");
    }

    #[tokio::test]
    async fn unknown_tasks_are_not_created_by_updates() {
        let store = TaskStore::new(Duration::from_secs(3600));
        assert!(!store.update("nope", TaskStatus::Processing, 20, "x", None).await);
        assert!(store.all().await.is_empty());
        assert!(store.force_complete("nope").await.is_none());
    }

    #[tokio::test]
    async fn force_complete_overrides_any_state() {
        let store = TaskStore::new(Duration::from_secs(3600));
        let id = store.create("x").await;
        store.update(&id, TaskStatus::Error, 0, "failed", None).await;

        let record = store.force_complete(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_records() {
        let store = TaskStore::new(Duration::from_secs(3600));
        store.create("old").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = store.create("fresh").await;

        let report = store.sweep_older_than(Duration::from_millis(10)).await;
        assert_eq!(report, SweepReport { removed_tasks: 1, active_tasks: 1 });
        assert!(store.get(&fresh).await.is_some());
        assert_eq!(store.sweep().await.removed_tasks, 0);
    }

    #[test]
    fn processing_time_picks_a_unit() {
        assert_eq!(format_processing_time(12.5), "12.50s");
        assert_eq!(format_processing_time(90.0), "1.50min");
        assert_eq!(format_processing_time(5400.0), "1.50h");
    }
}
