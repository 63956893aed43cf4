//! Save coalescing.
//!
//! [`SaveDebouncer`] is a generation counter: every `schedule` supersedes the
//! previous one, and a firing only runs if nothing newer was scheduled or
//! cancelled in the meantime. Time is delegated to a [`SaveScheduler`].

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Runs `task` after `delay`.
pub trait SaveScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Timer-backed scheduler on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl SaveScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Scheduler that only fires when told to. Lets callers step through
/// debounce windows deterministically.
#[derive(Default, Clone)]
pub struct ManualScheduler {
    tasks: Arc<Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled firings not yet run.
    pub fn pending(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Run every scheduled firing in scheduling order, as if all delays had
    /// elapsed. Returns how many ran.
    pub async fn fire_all(&self) -> usize {
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let fired = tasks.len();
        for (_, task) in tasks {
            task.await;
        }
        fired
    }
}

impl SaveScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push((delay, task)),
            Err(poisoned) => poisoned.into_inner().push((delay, task)),
        }
    }
}

#[derive(Debug, Default)]
struct DebounceState {
    generation: u64,
    armed: bool,
}

pub struct SaveDebouncer {
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
    scheduler: Arc<dyn SaveScheduler>,
}

impl SaveDebouncer {
    pub fn new(delay: Duration, scheduler: Arc<dyn SaveScheduler>) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState::default())),
            scheduler,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the debouncer with `task`, superseding any earlier pending task.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = {
            let mut state = lock_state(&self.state);
            state.generation += 1;
            state.armed = true;
            state.generation
        };

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(
            self.delay,
            async move {
                let current = {
                    let mut state = lock_state(&state);
                    let current = state.armed && state.generation == ticket;
                    if current {
                        state.armed = false;
                    }
                    current
                };
                if current {
                    task.await;
                }
            }
            .boxed(),
        );
    }

    /// Disarm. Returns whether a task was pending.
    pub fn cancel(&self) -> bool {
        let mut state = lock_state(&self.state);
        let was_armed = state.armed;
        state.armed = false;
        state.generation += 1;
        was_armed
    }

    pub fn is_pending(&self) -> bool {
        lock_state(&self.state).armed
    }
}

fn lock_state(state: &Mutex<DebounceState>) -> std::sync::MutexGuard<'_, DebounceState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
