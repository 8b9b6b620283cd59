//! Exchange names, routing keys and topic pattern matching

pub const EXCHANGE_DIRECT: &str = "peril_direct";
pub const EXCHANGE_TOPIC: &str = "peril_topic";
pub const EXCHANGE_DEAD_LETTER: &str = "peril_dlx";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Durable queue shared by every client for war recognitions
pub const WAR_QUEUE: &str = "war";
/// Durable queue the server drains for game logs
pub const GAME_LOG_QUEUE: &str = "game_logs";
/// Transient queue the server uses to watch wars without competing for them
pub const WAR_OBSERVER_QUEUE: &str = "war_observer";
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

/// Builds `<prefix>.<username>`
pub fn user_key(prefix: &str, username: &str) -> String {
    format!("{}.{}", prefix, username)
}

/// Builds `<prefix>.*`
pub fn wildcard_key(prefix: &str) -> String {
    format!("{}.*", prefix)
}

/// Matches a dot separated routing key against a binding pattern.
///
/// `*` matches exactly one word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            // Either `#` swallows nothing, or it swallows one more word
            match_words(&pattern[1..], key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => match_words(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => match_words(&pattern[1..], &key[1..]),
        _ => false,
    }
}
