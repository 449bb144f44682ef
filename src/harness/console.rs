use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::{wait_for_exit, Controls, HarnessState};

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Exit,
    Ignore,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Command::Toggle,
            "q" | "quit" | "exit" => Command::Exit,
            _ => Command::Ignore,
        }
    }
}

/// Reads stdin on a dedicated thread so a pending read never holds up
/// runtime shutdown. The channel closes on EOF.
pub fn spawn_input_reader() -> UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let command = match line {
                Ok(line) => Command::parse(&line),
                Err(e) => {
                    tracing::warn!("Failed to read console input: {}", e);
                    break;
                }
            };
            if tx.send(command).is_err() || command == Command::Exit {
                break;
            }
        }
    });
    rx
}

/// Applies console commands until exit is requested, input ends, Ctrl+C is
/// pressed or the recording loop gives up. Leaves the harness exiting.
pub async fn run_console(controls: Arc<Controls>, mut input: UnboundedReceiver<Command>) {
    let mut state = controls.subscribe();
    loop {
        tokio::select! {
            command = input.recv() => match command {
                Some(Command::Toggle) => {
                    controls.toggle();
                }
                Some(Command::Ignore) => {}
                Some(Command::Exit) | None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = wait_for_exit(&mut state) => break,
        }
    }
    controls.exit();
}

/// Redraws the one-line status every second until the harness exits.
pub async fn run_status(controls: Arc<Controls>) {
    let mut state = controls.subscribe();
    let mut interval = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        print!("\r{}", controls.status_line());
        let _ = io::stdout().flush();
        if controls.state() == HarnessState::Exiting {
            println!();
            break;
        }
    }
}
