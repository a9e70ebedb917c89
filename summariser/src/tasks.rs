// Background task results, keyed by task id
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Public state of a background task, as returned by the polling endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState<T> {
    Processing,
    Completed { result: T },
    Failed { error: String },
}

impl<T> TaskState<T> {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskState::Processing)
    }
}

/// Every slot is held by a task that is still processing.
#[derive(Debug, Error)]
#[error("Too many summaries in progress ({in_flight}), try again later")]
pub struct TaskStoreFull {
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct TaskSettings {
    /// How long a finished task stays retrievable
    pub ttl: Duration,
    pub max_entries: usize,
    pub sweep_interval: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<Option<&common::TasksConfig>> for TaskSettings {
    fn from(cfg: Option<&common::TasksConfig>) -> Self {
        let defaults = Self::default();
        Self {
            ttl: cfg
                .and_then(|c| c.ttl_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            max_entries: cfg.and_then(|c| c.max_entries).unwrap_or(defaults.max_entries),
            sweep_interval: cfg
                .and_then(|c| c.sweep_interval_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

struct Entry<T> {
    state: TaskState<T>,
    finished_at: Option<Instant>,
}

/// In-memory task table. Finished tasks expire after the TTL, and when the
/// table is full the oldest finished task makes room for a new one.
/// Tasks still processing are never evicted, so a table full of them
/// refuses new tasks.
pub struct TaskStore<T> {
    settings: TaskSettings,
    entries: Mutex<HashMap<Uuid, Entry<T>>>,
}

impl<T: Clone> TaskStore<T> {
    pub fn new(settings: TaskSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new processing task and return its id.
    pub fn create(&self) -> Result<Uuid, TaskStoreFull> {
        let id = Uuid::new_v4();
        let mut entries = self.entries();

        if entries.len() >= self.settings.max_entries {
            let oldest = entries
                .iter()
                .filter_map(|(id, e)| e.finished_at.map(|at| (*id, at)))
                .min_by_key(|(_, at)| *at)
                .map(|(id, _)| id);
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                    debug!(task_id = %oldest, "evicted oldest finished task");
                }
                None => {
                    warn!(in_flight = entries.len(), "task store full, rejecting new task");
                    return Err(TaskStoreFull {
                        in_flight: entries.len(),
                    });
                }
            }
        }

        entries.insert(
            id,
            Entry {
                state: TaskState::Processing,
                finished_at: None,
            },
        );
        Ok(id)
    }

    fn finish(&self, id: Uuid, state: TaskState<T>) {
        if let Some(entry) = self.entries().get_mut(&id) {
            entry.state = state;
            entry.finished_at = Some(Instant::now());
        }
    }

    pub fn complete(&self, id: Uuid, result: T) {
        self.finish(id, TaskState::Completed { result });
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) {
        self.finish(id, TaskState::Failed { error: error.into() });
    }

    /// Current state, or `None` for unknown or expired ids.
    pub fn get(&self, id: &Uuid) -> Option<TaskState<T>> {
        let entries = self.entries();
        let entry = entries.get(id)?;
        match entry.finished_at {
            Some(at) if at.elapsed() >= self.settings.ttl => None,
            _ => Some(entry.state.clone()),
        }
    }

    /// Drop finished tasks older than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.settings.ttl;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.finished_at.map_or(true, |at| at.elapsed() < ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> TaskStore<T> {
    /// Periodically evict expired tasks for as long as the runtime lives.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = store.settings.sweep_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = store.evict_expired();
                if removed > 0 {
                    info!(removed, remaining = store.len(), "task sweeper evicted expired tasks");
                }
            }
        })
    }
}
