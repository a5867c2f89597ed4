//! Shared output state of a session.
//!
//! The consumable buffer, the rolling history and the run state live behind one
//! mutex with one condition variable. The stream reader is the only appender;
//! the ready-wait engine clears the buffer when it returns a match.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle of the spawned program as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Stopped,
}

#[derive(Debug)]
pub(crate) struct OutputState {
    /// Bytes received since the last successful ready-read.
    pub(crate) buffer: Vec<u8>,
    history: VecDeque<u8>,
    max_history: usize,
    run_state: RunState,
    /// Bumped on every start so a reader left over from an earlier session
    /// cannot touch the current one.
    generation: u64,
}

impl OutputState {
    fn new(max_history: usize) -> Self {
        Self {
            buffer: Vec::new(),
            history: VecDeque::new(),
            max_history,
            run_state: RunState::NotStarted,
            generation: 0,
        }
    }

    /// Append a chunk to both the buffer and the history, dropping the oldest
    /// history bytes past the cap.
    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.history.extend(chunk);
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub(crate) fn run_state(&self) -> RunState {
        self.run_state
    }

    pub(crate) fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(crate) fn history_bytes(&self) -> Vec<u8> {
        self.history.iter().copied().collect()
    }

    fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.is_running()
    }
}

/// Output state plus the condition waiters block on.
#[derive(Debug)]
pub(crate) struct SharedOutput {
    state: Mutex<OutputState>,
    ready: Condvar,
}

impl SharedOutput {
    pub(crate) fn new(max_history: usize) -> Self {
        Self {
            state: Mutex::new(OutputState::new(max_history)),
            ready: Condvar::new(),
        }
    }

    /// Lock the state. The state is plain bytes and flags, so a panic while
    /// holding the lock cannot leave it half-updated; poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until notified or `timeout` elapses. Callers must recheck their
    /// predicate afterwards.
    pub(crate) fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, OutputState>,
        timeout: Duration,
    ) -> MutexGuard<'a, OutputState> {
        let (guard, _) = self
            .ready
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        guard
    }

    /// Mark a new session as running and return its reader generation.
    pub(crate) fn begin_session(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.run_state = RunState::Running;
        state.generation
    }

    /// Append output from the reader of `generation`. Stale readers are ignored.
    pub(crate) fn append(&self, generation: u64, chunk: &[u8]) {
        let mut state = self.lock();
        if !state.accepts(generation) {
            return;
        }
        state.append(chunk);
        self.ready.notify_all();
    }

    /// Whether the reader of `generation` should keep going.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.lock().accepts(generation)
    }

    /// Called by an exiting reader. Only the current generation stops the session.
    pub(crate) fn reader_stopped(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation && state.run_state == RunState::Running {
            state.run_state = RunState::Stopped;
        }
        self.ready.notify_all();
    }

    /// Stop whatever session is current and wake every waiter.
    pub(crate) fn stop(&self) {
        self.lock().run_state = RunState::Stopped;
        self.ready.notify_all();
    }

    /// Drop the buffer and the history.
    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.buffer.clear();
        state.history.clear();
    }
}
