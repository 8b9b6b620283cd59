use shared::{PubSubError, Territory};

/// Errors from REPL commands and local game actions
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no command given")]
    Empty,

    #[error("unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("the game is paused")]
    Paused,

    #[error("you have no unit with id {0}")]
    UnknownUnit(u32),

    #[error("{territory} is held by {owner}, move units there to attack it")]
    Occupied { territory: Territory, owner: String },

    #[error(transparent)]
    Publish(#[from] PubSubError),
}
