//! Background stream reader.
//!
//! One thread per session drains the controller side of the pty into the shared
//! buffer and history. It polls with a short timeout so a stop request is noticed
//! within one interval even when the program is silent, and it marks the session
//! stopped on its way out whatever the reason.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::state::SharedOutput;
use crate::utils::guard::OnExit;

/// Upper bound on how long the reader goes without checking for a stop request.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn spawn(
    output: File,
    shared: Arc<SharedOutput>,
    generation: u64,
    chunk_size: usize,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("agterm-reader-{generation}"))
        .spawn(move || run(output, &shared, generation, chunk_size))
}

fn run(mut output: File, shared: &SharedOutput, generation: u64, chunk_size: usize) {
    let _stopped = OnExit::new(|| shared.reader_stopped(generation));
    let mut chunk = vec![0u8; chunk_size.max(1)];

    while shared.is_current(generation) {
        match wait_readable(&output, POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("PTY poll failed, reader exiting: {}", e);
                break;
            }
        }

        match output.read(&mut chunk) {
            Ok(0) => {
                debug!("PTY reached end of stream");
                break;
            }
            Ok(n) => shared.append(generation, &chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO once the last holder of the subordinate side is gone.
                debug!("PTY read ended: {}", e);
                break;
            }
        }
    }
}

/// Wait up to `timeout` for `file` to have data (or a hangup) pending.
fn wait_readable(file: &File, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `pollfd` is a single valid entry that outlives the call, and the
    // descriptor stays open because `file` is borrowed for the duration.
    let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
    if ready < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ready > 0)
}
