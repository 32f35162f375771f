//! In-memory task registry.
//!
//! The store is the single source of truth for task state. The map lock only
//! guards membership; each task sits behind its own mutex so updates to
//! different tasks never contend.
//!
//! Lock order: map → task. Holders of a task lock never take the map lock.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use indexmap::IndexMap;

use civdl_core::download::{DownloadError, DownloadResult, Task, TaskId, TaskSpec, TaskUpdate};

/// Number of finished tasks kept before the oldest are evicted.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

struct Slot {
    task: Task,
    /// Set once the slot has left the map; late updates must not count.
    removed: bool,
}

type SharedSlot = Arc<Mutex<Slot>>;

struct StoreInner {
    tasks: RwLock<IndexMap<TaskId, SharedSlot>>,
    non_terminal: AtomicUsize,
    history_limit: usize,
}

/// Cloneable handle to the task registry.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<StoreInner>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskStore {
    /// Create an empty store retaining at most `history_limit` finished tasks.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tasks: RwLock::new(IndexMap::new()),
                non_terminal: AtomicUsize::new(0),
                history_limit,
            }),
        }
    }

    /// Insert a new queued task.
    pub fn create(&self, spec: TaskSpec) -> Task {
        let task = Task::new(spec, Utc::now());
        let snapshot = task.clone();
        {
            let mut tasks = self
                .inner
                .tasks
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            tasks.insert(
                task.id,
                Arc::new(Mutex::new(Slot {
                    task,
                    removed: false,
                })),
            );
            self.inner.non_terminal.fetch_add(1, Ordering::SeqCst);
            self.evict_excess_history(&mut tasks);
        }
        tracing::debug!(target: "civdl.download", id = %snapshot.id, "Task created");
        snapshot
    }

    fn slot(&self, id: TaskId) -> DownloadResult<SharedSlot> {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| DownloadError::not_found(id))
    }

    /// Current snapshot of one task.
    pub fn get(&self, id: TaskId) -> DownloadResult<Task> {
        let slot = self.slot(id)?;
        let guard = lock(&slot);
        if guard.removed {
            return Err(DownloadError::not_found(id));
        }
        Ok(guard.task.clone())
    }

    /// Snapshot of all tasks in insertion order.
    pub fn list(&self) -> Vec<Task> {
        let slots: Vec<SharedSlot> = self
            .inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter_map(|slot| {
                let guard = lock(slot);
                (!guard.removed).then(|| guard.task.clone())
            })
            .collect()
    }

    /// Apply an update and return the resulting snapshot.
    pub fn update(&self, id: TaskId, update: TaskUpdate) -> DownloadResult<Task> {
        let slot = self.slot(id)?;
        let mut guard = lock(&slot);
        if guard.removed {
            return Err(DownloadError::not_found(id));
        }
        let was_terminal = guard.task.status.is_terminal();
        guard.task.apply(update, Utc::now())?;
        if !was_terminal && guard.task.status.is_terminal() {
            self.inner.non_terminal.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(guard.task.clone())
    }

    /// Remove a task regardless of its state.
    ///
    /// Callers are responsible for stopping any transfer first.
    pub fn delete(&self, id: TaskId) -> DownloadResult<Task> {
        let slot = self
            .inner
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id)
            .ok_or_else(|| DownloadError::not_found(id))?;
        let mut guard = lock(&slot);
        guard.removed = true;
        if !guard.task.status.is_terminal() {
            self.inner.non_terminal.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(guard.task.clone())
    }

    /// Remove every task in a terminal state. Returns how many were removed.
    pub fn clear_history(&self) -> usize {
        let mut tasks = self
            .inner
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, slot| {
            let mut guard = lock(slot);
            if guard.task.status.is_terminal() {
                guard.removed = true;
                false
            } else {
                true
            }
        });
        before - tasks.len()
    }

    /// Count of tasks not yet in a terminal state. O(1).
    pub fn active_count(&self) -> usize {
        self.inner.non_terminal.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_excess_history(&self, tasks: &mut IndexMap<TaskId, SharedSlot>) {
        let terminal: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, slot)| lock(slot).task.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        let excess = terminal.len().saturating_sub(self.inner.history_limit);
        for id in terminal.into_iter().take(excess) {
            if let Some(slot) = tasks.shift_remove(&id) {
                lock(&slot).removed = true;
                tracing::debug!(target: "civdl.download", %id, "Evicted finished task from history");
            }
        }
    }
}

/// Presentation order: running tasks, then queued ones in FIFO order, then
/// finished tasks newest first.
pub fn display_order(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by_key(|task| {
        let rank = if task.status.is_running() {
            0
        } else if task.status.is_terminal() {
            2
        } else {
            1
        };
        let finished = if rank == 2 {
            Reverse(task.completed_at.unwrap_or(task.created_at))
        } else {
            Reverse(chrono::DateTime::<Utc>::MIN_UTC)
        };
        (rank, finished)
    });
    tasks
}
