//! Line-oriented driver for an agterm session.
//!
//! Each stdin line is run as a command and its output printed once the program
//! is back at its prompt. A few lines are handled by the driver itself:
//!
//! - `:ctrl <letter>` sends a control character (`:ctrl c` interrupts)
//! - `:restart` replaces the program with a fresh one
//! - `:history` prints the rolling output history
//! - `:quit` disconnects and exits

use agterm::utils;
use agterm::{AgTermSession, TermConfig};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging before anything else
    utils::logger::init_logging();

    let config = TermConfig::from_env().context("failed to load configuration")?;
    let timeout_ms = config.default_timeout_ms;
    let session = AgTermSession::connect_with(config)
        .await
        .context("failed to start terminal session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let result = match line.trim() {
            ":quit" => break,
            ":history" => Ok(session.history()),
            ":restart" => session
                .restart(timeout_ms)
                .await
                .map(|prompt| prompt.unwrap_or_default()),
            cmd if cmd.starts_with(":ctrl") => {
                match cmd.trim_start_matches(":ctrl").trim().chars().next() {
                    Some(letter) => session.send_control(letter).await.map(|_| String::new()),
                    None => Ok("usage: :ctrl <letter>\n".to_string()),
                }
            }
            _ => session.execute_command(&line, timeout_ms).await,
        };

        match result {
            Ok(output) => print!("{output}"),
            Err(e) => {
                tracing::error!("Command failed: {}", e);
                eprintln!("error: {e}");
            }
        }
        if !session.is_alive() {
            eprintln!("session is not running; use :restart");
        }
    }

    session.disconnect().await;
    Ok(())
}
