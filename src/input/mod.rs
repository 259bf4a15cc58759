//! Operator input sources feeding the control loop.

pub mod button;

use std::io::{self, BufRead, IsTerminal};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::events::InputEvent;

/// Map one line typed on the console to an input event.
pub fn parse_command(line: &str) -> Option<InputEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "t" | "trigger" => Some(InputEvent::Trigger),
        "q" | "quit" | "exit" => Some(InputEvent::Quit),
        _ => None,
    }
}

/// Listen on stdin when it is an interactive terminal: Enter, space or `t`
/// triggers, `q` (or end of input) quits.
pub fn spawn_keyboard_listener(tx: Sender<InputEvent>) -> Result<Option<JoinHandle<()>>> {
    if !io::stdin().is_terminal() {
        debug!("stdin is not a terminal; keyboard trigger disabled");
        return Ok(None);
    }
    info!("keyboard trigger ready: Enter to trigger, q to quit");
    let handle = thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(event) => {
                        if tx.send(event).is_err() || event == InputEvent::Quit {
                            return;
                        }
                    }
                    None => debug!(input = %line.trim(), "unrecognised console input"),
                }
            }
            let _ = tx.send(InputEvent::Quit);
        })
        .context("failed to spawn keyboard listener")?;
    Ok(Some(handle))
}
