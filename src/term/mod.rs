//! Driving an interactive program over a pseudo-terminal.
//!
//! [`AgTerm`] owns one spawned program at a time and turns its asynchronous
//! output into a "send a command, get exactly its output" contract:
//!
//! - `launcher` spawns the program on a fresh pty in its own process group
//! - `reader` drains the pty into the shared buffer and history
//! - `wait` blocks until a ready marker shows up in the sanitized buffer
//!
//! The session does not serialize concurrent commands. Callers issue one
//! command at a time per session, or wrap it as [`crate::AgTermSession`] does.

mod launcher;
mod reader;
mod state;
mod wait;

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use portable_pty::{Child, ChildKiller, MasterPty};
use tracing::{debug, info, warn};

use crate::config::TermConfig;
use crate::error::{Result, TermError};
use crate::sanitize::sanitize;
use crate::utils::guard::OnExit;

pub use launcher::{session_env, SHELL, TERMINAL_COLS, TERMINAL_ROWS};
pub use reader::POLL_INTERVAL;
pub use state::RunState;
pub use wait::DIAGNOSTIC_TAIL_CHARS;

use launcher::Launched;
use state::SharedOutput;

/// How long `close` waits for the killed program to be reaped.
const EXIT_GRACE: Duration = Duration::from_millis(200);
/// How long `close` waits for the reader thread before detaching it.
const READER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);
const TEARDOWN_POLL: Duration = Duration::from_millis(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The spawned program and the controller side of its terminal.
struct Process {
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
    reader: JoinHandle<()>,
}

impl Process {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGKILL the whole process group the program leads.
    fn terminate_group(&mut self) {
        match self
            .child
            .process_id()
            .and_then(|pid| libc::pid_t::try_from(pid).ok())
        {
            Some(pgid) => {
                // SAFETY: killpg takes plain integers and touches no memory of ours.
                if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
                    debug!(
                        "Failed to kill process group {}: {}",
                        pgid,
                        io::Error::last_os_error()
                    );
                }
            }
            None => {
                if let Err(e) = self.child.kill() {
                    debug!("Failed to kill child: {}", e);
                }
            }
        }
    }

    fn wait_for_exit(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Child exited: {:?}", status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(TEARDOWN_POLL),
                Ok(None) => {
                    debug!("Child not reaped within {:?}", grace);
                    return;
                }
                Err(e) => {
                    debug!("Failed to reap child: {}", e);
                    return;
                }
            }
        }
    }
}

fn join_reader(reader: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !reader.is_finished() {
        if Instant::now() >= deadline {
            warn!("Reader thread still running after {:?}, detaching it", timeout);
            return;
        }
        thread::sleep(TEARDOWN_POLL);
    }
    if reader.join().is_err() {
        warn!("Reader thread panicked");
    }
}

/// A programmatically driven terminal session.
///
/// ```no_run
/// use std::time::Duration;
/// use agterm::{AgTerm, TermConfig};
///
/// # fn main() -> agterm::Result<()> {
/// let term = AgTerm::new(TermConfig::with_command("/bin/sh"))?;
/// term.read_until_ready(Duration::from_secs(5))?;
/// let output = term.send_and_read_until_ready("echo hi", Duration::from_secs(5))?;
/// assert!(output.contains("hi"));
/// # Ok(())
/// # }
/// ```
pub struct AgTerm {
    config: TermConfig,
    shared: Arc<SharedOutput>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    process: Mutex<Option<Process>>,
    /// Serializes start/close. Never held while waiting on output.
    lifecycle: Mutex<()>,
}

impl AgTerm {
    /// Creates a session and starts its program.
    ///
    /// # Arguments
    /// * `config` - Shell command line, ready markers, history cap and the
    ///   pty read chunk size
    ///
    /// # Returns
    /// A running session, [`TermError::Config`] for an invalid `config`, or
    /// [`TermError::Session`] when the pty or the shell cannot be set up. The
    /// first prompt is not awaited; call [`AgTerm::read_until_ready`] for it.
    pub fn new(config: TermConfig) -> Result<Self> {
        config.validate()?;

        // Shared output outlives individual programs across restarts
        let term = Self {
            shared: Arc::new(SharedOutput::new(config.max_history_bytes)),
            config,
            writer: Mutex::new(None),
            process: Mutex::new(None),
            lifecycle: Mutex::new(()),
        };
        term.start()?;
        Ok(term)
    }

    /// Spawn the configured program. Fails if a program is already running;
    /// use [`AgTerm::restart`] to replace it.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        if lock(&self.process).is_some() {
            return Err(TermError::Session("session already started".into()));
        }

        // Spawn on a fresh pty; a failed first start leaves the session Stopped
        let Launched {
            mut child,
            master,
            writer,
            output,
        } = launcher::launch(&self.config).inspect_err(|_| self.shared.stop())?;

        // New generation: a reader left over from a previous run can no
        // longer append to or stop this one
        let generation = self.shared.begin_session();
        let stop_on_error = OnExit::new(|| self.shared.stop());
        let reader = reader::spawn(
            output,
            Arc::clone(&self.shared),
            generation,
            self.config.read_chunk_size,
        )
        .map_err(|e| {
            if let Err(kill_err) = child.kill() {
                debug!("Failed to kill child after reader error: {}", kill_err);
            }
            TermError::session("failed to start reader thread", e)
        })?;
        stop_on_error.disarm();

        // Publish the input side last, once output is being collected
        *lock(&self.writer) = Some(writer);
        *lock(&self.process) = Some(Process {
            child,
            master,
            reader,
        });
        Ok(())
    }

    /// Kill the program's process group, close the terminal and stop the reader.
    ///
    /// Teardown is best effort: signal, reap and join failures are logged and
    /// ignored. The buffer and history are kept; closing twice is harmless.
    pub fn close(&self) {
        let _lifecycle = lock(&self.lifecycle);

        // Wake waiters and tell the reader to exit before tearing anything down
        self.shared.stop();

        let process = lock(&self.process).take();
        let Some(mut process) = process else {
            *lock(&self.writer) = None;
            return;
        };

        let pid = process.child.process_id();
        process.terminate_group();
        process.wait_for_exit(EXIT_GRACE);

        // Close input, then the controller, so the reader sees end of stream
        *lock(&self.writer) = None;
        let Process { master, reader, .. } = process;
        drop(master);
        join_reader(reader, READER_JOIN_TIMEOUT);

        info!(pid = ?pid, "Session closed");
    }

    /// Close, clear buffer and history, start again and optionally wait for
    /// the new program's first prompt.
    pub fn restart(&self, wait_for_prompt: bool, timeout: Duration) -> Result<Option<String>> {
        self.close();
        self.shared.clear();
        self.start()?;
        info!(command = %self.config.command, "Session restarted");

        if wait_for_prompt {
            self.read_until_ready(timeout).map(Some)
        } else {
            Ok(None)
        }
    }

    /// True while the reader runs and the program has not exited.
    pub fn is_alive(&self) -> bool {
        let running = self.shared.lock().is_running();
        running && self.child_alive()
    }

    fn child_alive(&self) -> bool {
        lock(&self.process).as_mut().is_some_and(Process::is_alive)
    }

    /// Send `text` without trailing whitespace, followed by one newline.
    pub fn write(&self, text: &str) -> Result<()> {
        let line = format!("{}\n", text.trim_end());
        self.write_raw(line.as_bytes())
    }

    /// Send bytes verbatim. A no-op when the session has no open input side.
    pub fn write_raw(&self, data: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        let Some(writer) = writer.as_mut() else {
            return Ok(());
        };
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Send the control byte for `letter`, e.g. `'C'` for an interrupt.
    /// Anything but an ASCII letter is ignored.
    pub fn send_control(&self, letter: char) -> Result<()> {
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            debug!("Ignoring control request for {:?}", letter);
            return Ok(());
        }
        self.write_raw(&[letter as u8 - b'A' + 1])
    }

    /// Wait for any configured ready marker.
    pub fn read_until_ready(&self, timeout: Duration) -> Result<String> {
        self.read_until_any(&self.config.ready_markers, timeout)
    }

    /// Wait until one of `markers` appears in the sanitized output, then return
    /// that output and consume it.
    ///
    /// On timeout the output stays buffered for the next call.
    pub fn read_until_any(&self, markers: &[String], timeout: Duration) -> Result<String> {
        wait::read_until_ready(&self.shared, markers, timeout, || self.child_alive())
    }

    /// [`AgTerm::write`] followed by [`AgTerm::read_until_ready`].
    pub fn send_and_read_until_ready(&self, command: &str, timeout: Duration) -> Result<String> {
        self.write(command)?;
        self.read_until_ready(timeout)
    }

    /// Sanitized copy of the rolling history.
    pub fn history(&self) -> String {
        let bytes = self.shared.lock().history_bytes();
        sanitize(&bytes)
    }

    pub fn history_len(&self) -> usize {
        self.shared.lock().history_len()
    }

    /// Bytes received since the last successful ready-read.
    pub fn buffer_len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock().run_state()
    }

    /// Process id (and process group id) of the running program.
    pub fn pid(&self) -> Option<u32> {
        lock(&self.process)
            .as_ref()
            .and_then(|process| process.child.process_id())
    }

    pub fn config(&self) -> &TermConfig {
        &self.config
    }
}

impl Drop for AgTerm {
    fn drop(&mut self) {
        self.close();
    }
}
