//! Server REPL commands

use crate::client_manager::ClientManager;
use log::info;
use shared::pubsub::publish_json;
use shared::routing::{EXCHANGE_DIRECT, PAUSE_KEY};
use shared::{PlayingState, PubSubError, Transport};

pub const HELP: &str = "\
Possible commands:
* pause
* resume
* status
* help
* quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Pause,
    Resume,
    Status,
    Help,
    Quit,
}

/// Parses a REPL line, `None` for anything unrecognised
pub fn parse_command(line: &str) -> Option<ServerCommand> {
    let word = line.split_whitespace().next()?.to_lowercase();
    match word.as_str() {
        "pause" => Some(ServerCommand::Pause),
        "resume" => Some(ServerCommand::Resume),
        "status" => Some(ServerCommand::Status),
        "help" => Some(ServerCommand::Help),
        "quit" => Some(ServerCommand::Quit),
        _ => None,
    }
}

/// Broadcasts the playing state to every client's pause queue
pub fn publish_playing_state(transport: &dyn Transport, is_paused: bool) -> Result<(), PubSubError> {
    if is_paused {
        info!("Publishing pause game state");
    } else {
        info!("Publishing resume game state");
    }
    publish_json(transport, EXCHANGE_DIRECT, PAUSE_KEY, &PlayingState { is_paused })
}

/// One line per connected player, plus a count of anonymous connections
pub fn describe_clients(clients: &ClientManager) -> String {
    let usernames = clients.usernames();
    let mut lines = vec![format!("{} connection(s)", clients.len())];

    for username in &usernames {
        let Some(client) = clients
            .find_by_username(username)
            .and_then(|id| clients.get(id))
        else {
            continue;
        };
        lines.push(format!(
            "* {} from {}, up {}s, {} frames in, {} deliveries out",
            username,
            client.addr,
            client.uptime().as_secs(),
            client.frames_in,
            client.deliveries_out
        ));
    }

    let anonymous = clients.len() - usernames.len();
    if anonymous > 0 {
        lines.push(format!("* {} without a player name", anonymous));
    }
    lines.join("\n")
}
