//! REPL input: reading lines and turning them into commands

use crate::error::CommandError;
use shared::{Rank, Territory};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Spawn { territory: Territory, rank: Rank },
    Move { to: Territory, unit_ids: Vec<u32> },
    Status,
    Help,
    Spam(usize),
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let (name, args) = match words.split_first() {
        Some((name, args)) => (name.to_lowercase(), args),
        None => return Err(CommandError::Empty),
    };

    match name.as_str() {
        "spawn" => {
            let [territory, rank] = args else {
                return Err(CommandError::Usage("spawn <territory> <rank>"));
            };
            Ok(Command::Spawn {
                territory: territory.parse().map_err(CommandError::InvalidArgument)?,
                rank: rank.parse().map_err(CommandError::InvalidArgument)?,
            })
        }
        "move" => {
            let Some((to, ids)) = args.split_first() else {
                return Err(CommandError::Usage("move <territory> <unit id> [unit id...]"));
            };
            if ids.is_empty() {
                return Err(CommandError::Usage("move <territory> <unit id> [unit id...]"));
            }

            let to = to.parse().map_err(CommandError::InvalidArgument)?;
            let unit_ids = ids
                .iter()
                .map(|id| {
                    id.parse::<u32>()
                        .map_err(|_| CommandError::InvalidArgument(format!("'{}' is not a unit id", id)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Command::Move { to, unit_ids })
        }
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "spam" => {
            let [count] = args else {
                return Err(CommandError::Usage("spam <count>"));
            };
            count
                .parse()
                .map(Command::Spam)
                .map_err(|_| CommandError::InvalidArgument(format!("'{}' is not a valid spam count", count)))
        }
        "quit" => Ok(Command::Quit),
        _ => Err(CommandError::UnknownCommand(name)),
    }
}

/// Reads commands one line at a time
pub struct InputManager<R = BufReader<Stdin>> {
    lines: Lines<R>,
}

impl InputManager {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> InputManager<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next non-blank line, `None` once input is closed
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
        Ok(None)
    }

    /// Next parsed command; parse failures are returned so the REPL can
    /// report them and keep reading
    pub async fn next_command(&mut self) -> std::io::Result<Option<Result<Command, CommandError>>> {
        Ok(self.next_line().await?.map(|line| parse_command(&line)))
    }
}
