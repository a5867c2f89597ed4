//! Async connect / execute / disconnect surface for tool-serving layers.
//!
//! The engine blocks on a condition variable, so every call runs on tokio's
//! blocking pool. Commands on one session are serialized here: a second
//! `execute_command` waits until the first has returned its output.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task;
use tracing::{info, warn};

use crate::config::TermConfig;
use crate::error::{Result, TermError};
use crate::term::AgTerm;

/// A connected terminal session.
#[derive(Clone)]
pub struct AgTermSession {
    term: Arc<AgTerm>,
    /// Held for the whole write-then-wait of one command.
    command_lock: Arc<Mutex<()>>,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| TermError::session("terminal task failed", e))?
}

impl AgTermSession {
    /// Connect with the default configuration.
    pub async fn connect() -> Result<Self> {
        Self::connect_with(TermConfig::default()).await
    }

    /// Starts a session and leaves it idle at a prompt with nothing buffered.
    ///
    /// # Arguments
    /// * `config` - Command, ready markers and the timeout used for each of
    ///   the two startup waits
    ///
    /// # Returns
    /// A session whose next `execute_command` sees only its own output, or the
    /// error of whichever startup step failed. A command that exits right away
    /// fails with [`TermError::ProcessDied`].
    pub async fn connect_with(config: TermConfig) -> Result<Self> {
        let term = blocking(move || {
            let timeout = config.default_timeout();
            let term = AgTerm::new(config)?;

            // Consume the startup prompt first, so the prompt answering the
            // priming line is not left behind for the first command
            term.read_until_ready(timeout)?;

            // Prime with an empty line and wait for the program to answer it
            term.send_and_read_until_ready("", timeout)?;
            Ok(term)
        })
        .await?;

        info!(pid = ?term.pid(), "Terminal session connected");
        Ok(Self {
            term: Arc::new(term),
            command_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Run `command` and return its sanitized output up to the next prompt.
    pub async fn execute_command(&self, command: &str, timeout_ms: u64) -> Result<String> {
        if command.trim().is_empty() {
            warn!("Empty command sent to terminal session");
        }

        let term = Arc::clone(&self.term);
        let command_lock = Arc::clone(&self.command_lock);
        let command = command.to_string();
        blocking(move || {
            let _serial = command_lock.lock().unwrap_or_else(PoisonError::into_inner);
            term.send_and_read_until_ready(&command, Duration::from_millis(timeout_ms))
        })
        .await
    }

    /// Send a control character, e.g. `'C'` to interrupt a running command.
    /// Does not wait for the command lock, so it can interrupt a pending command.
    pub async fn send_control(&self, letter: char) -> Result<()> {
        let term = Arc::clone(&self.term);
        blocking(move || term.send_control(letter)).await
    }

    /// Replace the program with a fresh one and wait for its prompt.
    pub async fn restart(&self, timeout_ms: u64) -> Result<Option<String>> {
        let term = Arc::clone(&self.term);
        let command_lock = Arc::clone(&self.command_lock);
        blocking(move || {
            let _serial = command_lock.lock().unwrap_or_else(PoisonError::into_inner);
            term.restart(true, Duration::from_millis(timeout_ms))
        })
        .await
    }

    pub fn history(&self) -> String {
        self.term.history()
    }

    pub fn is_alive(&self) -> bool {
        self.term.is_alive()
    }

    /// The underlying engine, for waits and writes the session API lacks.
    pub fn term(&self) -> &AgTerm {
        &self.term
    }

    /// Close the session. Clones of this handle see a dead session afterwards.
    pub async fn disconnect(self) {
        let term = Arc::clone(&self.term);
        if let Err(e) = task::spawn_blocking(move || term.close()).await {
            warn!("Terminal close task failed: {}", e);
        }
        info!("Terminal session disconnected");
    }
}
