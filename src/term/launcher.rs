//! Spawning the program on a fresh pseudo-terminal.

use std::fs::File;
use std::io::Write;
use std::os::fd::BorrowedFd;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, info};

use crate::config::TermConfig;
use crate::error::{Result, TermError};

// Fixed geometry keeps line wrapping predictable.
pub const TERMINAL_ROWS: u16 = 24;
pub const TERMINAL_COLS: u16 = 80;

/// Environment applied on top of the inherited one. It asks shells and the
/// programs they run for plain output: no terminal capabilities, a fixed
/// prompt, no pre-prompt hook and no terminal-integration metadata.
pub fn session_env() -> [(&'static str, &'static str); 5] {
    [
        ("TERM", "dumb"),
        ("PS1", "$ "),
        ("PROMPT_COMMAND", ""),
        ("VTE_VERSION", "0"),
        ("INSIDE_EMACS", "1"),
    ]
}

/// Interpreter every session command runs under, as `sh -c <command>`.
pub const SHELL: &str = "/bin/sh";

/// A running program and the controller side of its terminal.
pub(crate) struct Launched {
    pub(crate) child: Box<dyn Child + Send + Sync>,
    pub(crate) master: Box<dyn MasterPty + Send>,
    pub(crate) writer: Box<dyn Write + Send>,
    /// Independent handle on the controller descriptor for the stream reader.
    pub(crate) output: File,
}

/// Build the `sh -c` invocation of `config.command` with the session
/// environment and working directory applied.
fn shell_command(config: &TermConfig) -> Result<CommandBuilder> {
    let mut cmd = CommandBuilder::new(SHELL);
    cmd.args(["-c", config.command.as_str()]);

    // Explicit working directory must exist; otherwise inherit ours
    match &config.cwd {
        Some(cwd) if !cwd.is_dir() => {
            return Err(TermError::Session(format!(
                "working directory {} does not exist",
                cwd.display()
            )));
        }
        Some(cwd) => cmd.cwd(cwd),
        None => {
            if let Ok(cwd) = std::env::current_dir() {
                cmd.cwd(cwd);
            }
        }
    }

    // Fixed session environment first, so configured variables override it
    for (key, value) in session_env() {
        cmd.env(key, value);
    }
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    Ok(cmd)
}

/// Opens a pty, spawns `config.command` on it and hands back the controller side.
///
/// The command is a shell command line: quoting, `VAR=value` prefixes and
/// pipelines behave as they would at a prompt. portable-pty starts the shell
/// as a session (and process group) leader with the subordinate side as its
/// controlling terminal and stdio, so everything it runs shares one group.
///
/// # Arguments
/// * `config` - Command line, working directory and extra environment
///
/// # Returns
/// The child, the controller side, its writer and a read handle for the
/// stream reader. A program the shell cannot find is not an error here: the
/// shell reports it on the terminal and exits.
pub(crate) fn launch(config: &TermConfig) -> Result<Launched> {
    let cmd = shell_command(config)?;

    // Create PTY with fixed geometry
    let pair = native_pty_system()
        .openpty(PtySize {
            rows: TERMINAL_ROWS,
            cols: TERMINAL_COLS,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| TermError::session("failed to open PTY", e))?;

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| TermError::session(&format!("failed to spawn {:?}", config.command), e))?;

    // Drop slave side in parent process; ours would keep the terminal open
    // after the child exits.
    drop(pair.slave);

    match controller_handles(&*pair.master) {
        Ok((writer, output)) => {
            info!(
                command = %config.command,
                pid = ?child.process_id(),
                "Spawned session on a {}x{} pty", TERMINAL_COLS, TERMINAL_ROWS
            );
            Ok(Launched {
                child,
                master: pair.master,
                writer,
                output,
            })
        }
        Err(err) => {
            // Don't leave a shell running on a terminal nobody reads
            if let Err(e) = child.kill() {
                debug!("Failed to kill child after setup error: {}", e);
            }
            Err(err)
        }
    }
}

fn controller_handles(master: &(dyn MasterPty + Send)) -> Result<(Box<dyn Write + Send>, File)> {
    let writer = master
        .take_writer()
        .map_err(|e| TermError::session("failed to take PTY writer", e))?;

    let fd = master
        .as_raw_fd()
        .ok_or_else(|| TermError::Session("PTY master has no file descriptor".into()))?;
    // SAFETY: `fd` is owned by `master`, which stays alive for this whole call;
    // the borrow only lives long enough to duplicate it.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let output = borrowed
        .try_clone_to_owned()
        .map_err(|e| TermError::session("failed to duplicate PTY descriptor", e))?;

    Ok((writer, File::from(output)))
}
