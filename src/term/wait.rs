//! Ready-wait: block until a marker shows up in the sanitized buffer.
//!
//! Each pass sanitizes the whole consumable buffer under the lock and looks for
//! the markers in order. A match clears the buffer and returns the text. Otherwise
//! the pass ends in a timeout, a dead-process error, or a bounded wait on the
//! condition, after which everything is evaluated again from scratch.

use std::time::{Duration, Instant};

use tracing::{trace, warn};

use super::state::SharedOutput;
use crate::error::{Result, TermError};
use crate::sanitize::sanitize;

/// Characters of sanitized output carried by a timeout error.
pub const DIAGNOSTIC_TAIL_CHARS: usize = 150;

/// Longest single sleep between liveness checks when no output arrives.
const LIVENESS_RECHECK: Duration = Duration::from_millis(100);

pub(crate) fn read_until_ready(
    shared: &SharedOutput,
    markers: &[String],
    timeout: Duration,
    child_alive: impl Fn() -> bool,
) -> Result<String> {
    // No deadline when `timeout` is too large to represent
    let deadline = Instant::now().checked_add(timeout);
    let mut state = shared.lock();

    loop {
        let text = sanitize(&state.buffer);
        if let Some(marker) = markers.iter().find(|m| text.contains(m.as_str())) {
            trace!(marker = %marker, bytes = state.buffer.len(), "ready marker matched");
            state.buffer.clear();
            return Ok(text);
        }

        let remaining = deadline.map_or(Duration::MAX, |d| {
            d.saturating_duration_since(Instant::now())
        });
        if remaining.is_zero() {
            warn!(
                timeout_ms = millis(timeout),
                "no ready marker before deadline"
            );
            return Err(TermError::Timeout {
                tail: tail(&text, DIAGNOSTIC_TAIL_CHARS),
            });
        }

        if !(state.is_running() && child_alive()) {
            return Err(TermError::ProcessDied);
        }

        state = shared.wait_timeout(state, remaining.min(LIVENESS_RECHECK));
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> String {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) if max_chars > 0 => text[idx..].to_string(),
        Some(_) => String::new(),
        None => text.to_string(),
    }
}
