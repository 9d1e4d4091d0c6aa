//! Single-threaded cooperative event loop and the blocking bridge on top of it
//!
//! Every engine runs its I/O on an [`EventLoop`]: a current-thread tokio
//! runtime plus a [`LocalSet`] holding the engine's driver tasks. Nothing in
//! the engine is `Send`; there is no locking because nothing runs in parallel.
//!
//! Callers that want blocking semantics pump the same loop with
//! [`EventLoop::run_until`]: one slice at a time, re-checking a predicate after
//! each slice, until it holds or a deadline passes. No second thread is ever
//! started.

use crate::error::{NntpError, Result};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};
use tracing::warn;

/// Longest single loop slice before the predicate is evaluated again
const MAX_SLICE: Duration = Duration::from_millis(10);

/// Cooperative event loop shared by engines and their callers
///
/// Cloning is cheap and yields a handle to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

// Field order matters: the LocalSet (and the tasks it owns) drops before the runtime.
struct LoopInner {
    local: LocalSet,
    runtime: Runtime,
    progress: Notify,
    running: Cell<bool>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("running", &self.inner.running.get())
            .finish_non_exhaustive()
    }
}

/// Marks the loop as running for the lifetime of the guard
struct Running<'a>(&'a Cell<bool>);

impl<'a> Running<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Running(flag))
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl EventLoop {
    /// Create a loop backed by a fresh current-thread runtime
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime's I/O or timer driver cannot be created.
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner: Rc::new(LoopInner {
                local: LocalSet::new(),
                runtime,
                progress: Notify::new(),
                running: Cell::new(false),
            }),
        })
    }

    /// Schedule a task on the loop
    ///
    /// The task starts running the next time the loop is driven.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.inner.local.spawn_local(future)
    }

    /// Whether the loop is currently being driven on this thread
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Wake a caller blocked in [`run_once`](Self::run_once) so it re-evaluates its predicate
    pub(crate) fn notify_progress(&self) {
        self.inner.progress.notify_one();
    }

    /// Drive the loop until `future` completes
    ///
    /// # Errors
    ///
    /// Fails without running anything when called from inside the loop (for
    /// example from a delegate callback).
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let inner = &*self.inner;
        let Some(_running) = Running::enter(&inner.running) else {
            return Err(NntpError::permanent(
                "block_on called from inside the running event loop",
            ));
        };
        Ok(inner.runtime.block_on(inner.local.run_until(future)))
    }

    /// Drive the loop for one slice
    ///
    /// Returns once a task reports progress or `max_wait` elapses, whichever
    /// comes first. Called from inside the loop it returns immediately.
    pub fn run_once(&self, max_wait: Duration) {
        let inner = &*self.inner;
        let Some(_running) = Running::enter(&inner.running) else {
            return;
        };
        inner.runtime.block_on(inner.local.run_until(async {
            tokio::select! {
                _ = inner.progress.notified() => {}
                _ = tokio::time::sleep(max_wait) => {}
            }
        }));
    }

    /// Drive the loop until `predicate` holds or `deadline` passes
    ///
    /// The predicate is evaluated before the first slice and after each one.
    /// Returns `true` as soon as it holds and `false` once the deadline is
    /// reached. The calling thread blocks while the loop makes progress.
    ///
    /// Called from inside the loop (a delegate callback, a spawned task) this
    /// cannot block: the predicate is evaluated once and the result returned.
    ///
    /// # Example
    ///
    /// ```
    /// use nntp_engine::EventLoop;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use std::time::{Duration, Instant};
    ///
    /// let event_loop = EventLoop::new().unwrap();
    /// let done = Rc::new(Cell::new(false));
    ///
    /// let flag = done.clone();
    /// event_loop.spawn(async move {
    ///     tokio::time::sleep(Duration::from_millis(5)).await;
    ///     flag.set(true);
    /// });
    ///
    /// let deadline = Instant::now() + Duration::from_secs(5);
    /// assert!(event_loop.run_until(deadline, || done.get()));
    /// ```
    pub fn run_until(&self, deadline: Instant, mut predicate: impl FnMut() -> bool) -> bool {
        loop {
            if predicate() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.is_running() {
                warn!("run_until called from inside the event loop; not blocking");
                return false;
            }
            self.run_once((deadline - now).min(MAX_SLICE));
        }
    }

    /// [`run_until`](Self::run_until) with a deadline `timeout` from now
    pub fn run_until_timeout(&self, timeout: Duration, predicate: impl FnMut() -> bool) -> bool {
        self.run_until(Instant::now() + timeout, predicate)
    }
}
