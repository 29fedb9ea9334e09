use crate::controller::Command;
use std::num::NonZeroU32;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug)]
pub enum ConsoleInput {
    Command(Command),
    Quit,
    Help,
}

pub const HELP: &str = "commands: login <user> <password> | limit <n> | before <epoch-ms|now|0> | show | help | quit";

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let input = match (verb, args.as_slice()) {
        ("login", [username, password]) => ConsoleInput::Command(Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        }),
        // Passphrase deployments have no user name
        ("login", [password]) => ConsoleInput::Command(Command::Login {
            username: String::new(),
            password: password.to_string(),
        }),
        ("limit", [value]) => ConsoleInput::Command(Command::SetResultLimit(parse_limit(value)?)),
        ("before", [value]) => {
            ConsoleInput::Command(Command::SetUpperBound(parse_upper_bound(value)?))
        }
        ("show", []) => ConsoleInput::Command(Command::Show),
        ("help", []) => ConsoleInput::Help,
        ("quit" | "exit", []) => ConsoleInput::Quit,
        _ => return Err(format!("cannot parse '{}'", line.trim())),
    };
    Ok(Some(input))
}

pub fn parse_limit(value: &str) -> Result<NonZeroU32, String> {
    value
        .parse::<NonZeroU32>()
        .map_err(|_| format!("limit must be a positive integer, got '{}'", value))
}

/// `now` resolves to the current time, `0` means no upper bound
pub fn parse_upper_bound(value: &str) -> Result<u64, String> {
    if value == "now" {
        return Ok(chrono::Utc::now().timestamp_millis().max(0) as u64);
    }
    value
        .parse::<u64>()
        .map_err(|_| format!("upper bound must be epoch milliseconds, 'now' or 0, got '{}'", value))
}

/// Forwards parsed console lines to the controller until `quit` or EOF
pub async fn read_commands<R>(input: R, commands: mpsc::Sender<Command>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            Ok(Some(ConsoleInput::Command(command))) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            Ok(Some(ConsoleInput::Help)) => info!("{}", HELP),
            Ok(Some(ConsoleInput::Quit)) => break,
            Ok(None) => {}
            Err(e) => warn!("{} ({})", e, HELP),
        }
    }
    info!("Console closed");
}
