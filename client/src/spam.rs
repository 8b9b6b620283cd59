//! Floods the game log with junk entries to load-test the log consumer

use crate::error::CommandError;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::pubsub::{get_timestamp, publish_binary};
use shared::routing::{user_key, EXCHANGE_TOPIC, GAME_LOG_SLUG};
use shared::{GameLogEntry, Transport};

const SPAM_MESSAGES: [&str; 8] = [
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "A soldier will fight long and hard for a bit of colored ribbon.",
    "It is well that war is so terrible, otherwise we should grow too fond of it.",
    "The art of war is simple enough. Find out where your enemy is.",
    "All warfare is based on deception.",
    "In war, truth is the first casualty.",
    "Ask not what your country can do for you, ask what you can do for your country.",
];

pub fn random_message<R: Rng>(rng: &mut R) -> &'static str {
    SPAM_MESSAGES.choose(rng).copied().unwrap_or(SPAM_MESSAGES[0])
}

/// Publishes `count` junk entries on this player's game-log key
pub fn spam<R: Rng>(
    transport: &dyn Transport,
    username: &str,
    count: usize,
    rng: &mut R,
) -> Result<(), CommandError> {
    let routing_key = user_key(GAME_LOG_SLUG, username);
    for _ in 0..count {
        let entry = GameLogEntry {
            timestamp: get_timestamp(),
            username: username.to_string(),
            message: random_message(rng).to_string(),
        };
        publish_binary(transport, EXCHANGE_TOPIC, &routing_key, &entry)?;
    }
    info!("Published {} spam log entries as {}", count, username);
    Ok(())
}
