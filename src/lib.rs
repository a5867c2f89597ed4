//! agterm - drive an interactive shell (or any terminal program) from code.
//!
//! Send a command, block until the program is back at its prompt, and get the
//! command's output as plain text with the terminal control noise removed.
//!
//! - [`term::AgTerm`]: the blocking engine (spawn, read, wait, write, restart)
//! - [`session::AgTermSession`]: async connect / execute / disconnect wrapper
//! - [`sanitize::sanitize`]: raw terminal bytes to clean text
//! - [`config::TermConfig`]: command, markers, timeouts and limits
//!
//! # Example
//!
//! ```no_run
//! use agterm::{AgTermSession, TermConfig};
//!
//! #[tokio::main]
//! async fn main() -> agterm::Result<()> {
//!     let session = AgTermSession::connect_with(TermConfig::with_command("/bin/sh")).await?;
//!
//!     let output = session.execute_command("ls -la", 10_000).await?;
//!     println!("{output}");
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod sanitize;
pub mod session;
pub mod term;
pub mod utils;

// Re-export commonly used types
pub use config::TermConfig;
pub use error::{Result, TermError};
pub use sanitize::sanitize;
pub use session::AgTermSession;
pub use term::{AgTerm, RunState};
