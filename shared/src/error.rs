/// Errors raised by the message layer
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("transport closed")]
    TransportClosed,

    #[error("unknown exchange '{exchange}'")]
    UnknownExchange { exchange: String },

    #[error("unknown queue '{queue}'")]
    UnknownQueue { queue: String },

    #[error("no outstanding delivery {delivery_tag} on queue '{queue}'")]
    UnknownDelivery { queue: String, delivery_tag: u64 },

    #[error("queue '{queue}' already declared with a different type")]
    QueueTypeMismatch { queue: String },

    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("broker refused connection: {reason}")]
    Handshake { reason: String },

    #[error("frame too large: {size} bytes")]
    FrameTooLarge { size: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PubSubError {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PubSubError::TransportClosed | PubSubError::Io(_))
    }
}
