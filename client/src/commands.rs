//! Executes REPL commands against the shared game state

use crate::error::CommandError;
use crate::game::SharedGameState;
use crate::input::Command;
use crate::rendering::{render_help, render_status};
use crate::spam::spam;
use rand::Rng;
use shared::pubsub::publish_json;
use shared::routing::{user_key, ARMY_MOVES_PREFIX, EXCHANGE_TOPIC};
use shared::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text to show the player
    Message(String),
    Quit,
}

pub async fn execute<R: Rng>(
    command: Command,
    state: &SharedGameState,
    transport: &dyn Transport,
    rng: &mut R,
) -> Result<Reply, CommandError> {
    match command {
        Command::Spawn { territory, rank } => {
            let unit = state.write().await.spawn(territory, rank)?;
            Ok(Reply::Message(format!(
                "Spawned {} with id {} in {}",
                unit.rank, unit.id, unit.location
            )))
        }
        Command::Move { to, unit_ids } => {
            let mut game = state.write().await;
            let mut moved = game.clone();
            let event = moved.move_units(to, &unit_ids)?;
            let routing_key = user_key(ARMY_MOVES_PREFIX, game.username());
            publish_json(transport, EXCHANGE_TOPIC, &routing_key, &event)?;
            // Only a broadcast move is kept
            *game = moved;
            Ok(Reply::Message(format!(
                "Moved {} units to {}",
                event.units.len(),
                to
            )))
        }
        Command::Status => Ok(Reply::Message(render_status(&*state.read().await))),
        Command::Help => Ok(Reply::Message(render_help().to_string())),
        Command::Spam(count) => {
            let username = state.read().await.username().to_string();
            spam(transport, &username, count, rng)?;
            Ok(Reply::Message(format!("Published {} malicious logs", count)))
        }
        Command::Quit => Ok(Reply::Quit),
    }
}
