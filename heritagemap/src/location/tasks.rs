//! Named sampler task registry.
//!
//! At most one task may be registered under a given name. Starting a name
//! whose task is still alive is a no-op; a finished task is replaced.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RegisteredTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RegisteredTask {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Registry of uniquely named background tasks.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<&'static str, RegisteredTask>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("running", &self.running())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `make(token)` under `name` unless a live task already holds it.
    ///
    /// Returns `true` if a task was spawned. The check and the insert happen
    /// under the same shard lock, so concurrent callers cannot both spawn.
    pub fn spawn_unique<F, Fut>(&self, name: &'static str, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.tasks.entry(name) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_alive() {
                    return false;
                }
                existing.insert(Self::spawn(make));
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(Self::spawn(make));
                true
            }
        }
    }

    fn spawn<F, Fut>(make: F) -> RegisteredTask
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(make(token.clone()));
        RegisteredTask { token, handle }
    }

    /// Cancel and forget the task under `name`. Returns `true` if it was alive.
    pub fn stop(&self, name: &'static str) -> bool {
        match self.tasks.remove(name) {
            Some((_, task)) => {
                let alive = task.is_alive();
                task.token.cancel();
                alive
            }
            None => false,
        }
    }

    /// Whether a live task is registered under `name`.
    pub fn is_running(&self, name: &'static str) -> bool {
        self.tasks
            .get(name)
            .map(|task| task.is_alive())
            .unwrap_or(false)
    }

    /// Names of all live tasks.
    pub fn running(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| *entry.key())
            .collect();
        names.sort_unstable();
        names
    }

    /// Cancel every registered task.
    pub fn stop_all(&self) {
        self.tasks.retain(|_, task| {
            task.token.cancel();
            false
        });
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
