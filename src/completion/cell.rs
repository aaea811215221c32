//! Completion Cell
//!
//! A single-assignment holder for the eventual outcome of one asynchronous
//! operation. The producer completes it exactly once; any number of waiters
//! block (threads) or await (tasks) until it reaches a terminal state.
//!
//! # State Machine
//!
//! ```text
//!              complete(v)
//!   Pending ───────────────────▶ Completed(v)
//!      │   complete_exceptionally(e)
//!      ├───────────────────────▶ Failed(e)
//!      │   cancel()
//!      └───────────────────────▶ Cancelled
//! ```
//!
//! Terminal states are immutable: later transitions are rejected. Readers
//! resolve the outcome in priority order cancelled > failed > value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::{Error, Result};

enum State<V> {
    Pending,
    Completed(V),
    Failed(Arc<Error>),
    Cancelled,
}

impl<V> State<V> {
    fn name(&self) -> &'static str {
        match self {
            State::Pending => "Pending",
            State::Completed(_) => "Completed",
            State::Failed(_) => "Failed",
            State::Cancelled => "Cancelled",
        }
    }
}

/// Single-assignment, thread-safe result holder.
///
/// Share it as `Arc<CompletionCell<V>>`. Blocking waiters park on a condition
/// variable; async waiters park on a [`Notify`], so neither polls.
pub struct CompletionCell<V> {
    state: Mutex<State<V>>,
    condvar: Condvar,
    notify: Notify,
}

impl<V> Default for CompletionCell<V> {
    fn default() -> Self {
        Self::with_state(State::Pending)
    }
}

impl<V> std::fmt::Debug for CompletionCell<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCell")
            .field("state", &self.state.lock().name())
            .finish()
    }
}

impl<V> CompletionCell<V> {
    fn with_state(state: State<V>) -> Self {
        Self {
            state: Mutex::new(state),
            condvar: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Create a pending cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell that already holds `value`.
    pub fn completed(value: V) -> Self {
        Self::with_state(State::Completed(value))
    }

    /// Create a cell that already holds a failure.
    pub fn failed(error: Error) -> Self {
        Self::with_state(State::Failed(Arc::new(error)))
    }

    fn transition(&self, next: State<V>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, State::Pending) {
            return false;
        }
        *state = next;
        drop(state);

        self.condvar.notify_all();
        self.notify.notify_waiters();
        true
    }

    /// Pending → completed with `value`. Returns whether the transition happened.
    pub fn complete(&self, value: V) -> bool {
        self.transition(State::Completed(value))
    }

    /// Pending → failed with `error`. Returns whether the transition happened.
    pub fn complete_exceptionally(&self, error: Error) -> bool {
        self.transition(State::Failed(Arc::new(error)))
    }

    /// Pending → cancelled.
    ///
    /// Always returns `false`: cancellation is cooperative and never preempts
    /// the producer, which keeps running and whose result is then discarded.
    pub fn cancel(&self) -> bool {
        self.transition(State::Cancelled);
        false
    }

    /// True once the cell is in any terminal state, cancelled included.
    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), State::Cancelled)
    }

    pub fn is_completed_exceptionally(&self) -> bool {
        matches!(*self.state.lock(), State::Failed(_))
    }
}

impl<V: Clone> CompletionCell<V> {
    fn outcome(state: &State<V>) -> Option<Result<V>> {
        match state {
            State::Cancelled => Some(Err(Error::Cancelled)),
            State::Failed(error) => Some(Err(Error::Execution(Arc::clone(error)))),
            State::Completed(value) => Some(Ok(value.clone())),
            State::Pending => None,
        }
    }

    /// Non-blocking peek: `None` while pending.
    pub fn try_get(&self) -> Option<Result<V>> {
        Self::outcome(&self.state.lock())
    }

    /// Block the calling thread until the cell is terminal.
    ///
    /// Do not call this from inside an async task; use [`wait_async`](Self::wait_async).
    pub fn wait(&self) -> Result<V> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = Self::outcome(&state) {
                return outcome;
            }
            self.condvar.wait(&mut state);
        }
    }

    /// Block until the cell is terminal or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<V> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };

        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = Self::outcome(&state) {
                return outcome;
            }
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return Self::outcome(&state).unwrap_or(Err(Error::Timeout(timeout)));
            }
        }
    }

    /// Await the terminal outcome without blocking a runtime worker.
    pub async fn wait_async(&self) -> Result<V> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed.
            notified.as_mut().enable();

            if let Some(outcome) = self.try_get() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Await the terminal outcome for at most `timeout`.
    pub async fn wait_async_timeout(&self, timeout: Duration) -> Result<V> {
        match tokio::time::timeout(timeout, self.wait_async()).await {
            Ok(outcome) => outcome,
            Err(_) => self.try_get().unwrap_or(Err(Error::Timeout(timeout))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_new_cell_is_pending() {
        let cell: CompletionCell<u32> = CompletionCell::new();

        assert!(!cell.is_done());
        assert!(!cell.is_cancelled());
        assert!(!cell.is_completed_exceptionally());
        assert!(cell.try_get().is_none());
        assert_eq!(format!("{:?}", cell), "CompletionCell { state: \"Pending\" }");
    }

    #[test]
    fn test_completed_value_is_returned_to_every_wait() {
        let cell = CompletionCell::new();
        assert!(cell.complete(7));

        assert!(cell.is_done());
        assert_eq!(cell.wait().unwrap(), 7);
        assert_eq!(cell.wait().unwrap(), 7);
        assert_eq!(cell.wait_timeout(Duration::from_millis(1)).unwrap(), 7);
    }

    #[test]
    fn test_second_completion_is_rejected() {
        let cell = CompletionCell::new();

        assert!(cell.complete("first"));
        assert!(!cell.complete("second"));
        assert!(!cell.complete_exceptionally(Error::Dispatch("late".into())));

        assert_eq!(cell.wait().unwrap(), "first");
        assert!(!cell.is_completed_exceptionally());
    }

    #[test]
    fn test_exceptional_completion_is_reraised() {
        let cell: CompletionCell<bool> = CompletionCell::new();
        assert!(cell.complete_exceptionally(Error::Dispatch("smtp down".into())));

        assert!(cell.is_done());
        assert!(cell.is_completed_exceptionally());
        for _ in 0..2 {
            let err = cell.wait().unwrap_err();
            assert_matches!(&err, Error::Execution(inner) if matches!(**inner, Error::Dispatch(_)));
        }
    }

    #[test]
    fn test_cancel_takes_priority_and_never_preempts() {
        let cell: CompletionCell<bool> = CompletionCell::new();

        assert!(!cell.cancel());
        assert!(cell.is_cancelled());
        assert!(cell.is_done());

        // Producer finishing later cannot overwrite the cancellation
        assert!(!cell.complete(true));
        assert_matches!(cell.wait(), Err(Error::Cancelled));
    }

    #[test]
    fn test_cancel_after_completion_keeps_value() {
        let cell = CompletionCell::completed(3);

        assert!(!cell.cancel());
        assert!(!cell.is_cancelled());
        assert_eq!(cell.wait().unwrap(), 3);
    }

    #[test]
    fn test_prebuilt_constructors() {
        let ok = CompletionCell::completed(true);
        assert_eq!(ok.try_get().unwrap().unwrap(), true);

        let failed: CompletionCell<bool> = CompletionCell::failed(Error::Internal("boom".into()));
        assert!(failed.is_completed_exceptionally());
        assert_matches!(failed.try_get(), Some(Err(Error::Execution(_))));
    }

    #[test]
    fn test_wait_timeout_on_pending_cell() {
        let cell: CompletionCell<u8> = CompletionCell::new();
        let start = Instant::now();

        let result = cell.wait_timeout(Duration::from_millis(50));

        assert_matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(50));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(!cell.is_done());
    }

    #[test]
    fn test_blocking_wait_wakes_on_completion_from_other_thread() {
        let cell = Arc::new(CompletionCell::new());

        let producer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                cell.complete(99u64)
            })
        };

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.wait_timeout(Duration::from_secs(5)))
            })
            .collect();

        assert!(producer.join().unwrap());
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), 99);
        }
    }

    #[test]
    fn test_blocking_wait_observes_cancellation() {
        let cell: Arc<CompletionCell<u8>> = Arc::new(CompletionCell::new());

        let waiter = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.wait())
        };

        thread::sleep(Duration::from_millis(20));
        cell.cancel();

        assert_matches!(waiter.join().unwrap(), Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_async_wait_wakes_on_completion() {
        let cell = Arc::new(CompletionCell::new());

        let producer = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cell.complete(String::from("sent"));
            })
        };

        let value = cell.wait_async().await.unwrap();
        assert_eq!(value, "sent");
        producer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_wait_timeout() {
        let cell: CompletionCell<bool> = CompletionCell::new();

        let result = cell.wait_async_timeout(Duration::from_secs(3)).await;

        assert_matches!(result, Err(Error::Timeout(_)));
    }

    #[test]
    fn test_blocking_wait_from_sync_context_with_tokio_producer() {
        let cell = Arc::new(CompletionCell::new());
        let rt = tokio::runtime::Runtime::new().unwrap();

        let producer_cell = Arc::clone(&cell);
        rt.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer_cell.complete(1u8);
        });

        assert_eq!(cell.wait_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(tokio_test::block_on(cell.wait_async()).unwrap(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Complete(u32),
        Fail,
        Cancel,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Complete),
            Just(Op::Fail),
            Just(Op::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn prop_first_terminal_transition_wins(ops in proptest::collection::vec(op_strategy(), 1..8)) {
            let cell = CompletionCell::new();
            for op in &ops {
                match op {
                    Op::Complete(v) => { cell.complete(*v); }
                    Op::Fail => { cell.complete_exceptionally(Error::Internal("x".into())); }
                    Op::Cancel => { cell.cancel(); }
                }
            }

            prop_assert!(cell.is_done());
            let outcome = cell.wait();
            match &ops[0] {
                Op::Complete(v) => prop_assert_eq!(outcome.unwrap(), *v),
                Op::Fail => prop_assert!(matches!(outcome, Err(Error::Execution(_)))),
                Op::Cancel => prop_assert!(matches!(outcome, Err(Error::Cancelled))),
            }
        }
    }
}
