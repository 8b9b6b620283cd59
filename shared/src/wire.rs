//! Frames exchanged between a game process and the broker host over TCP.
//!
//! Every frame is a big-endian `u32` length followed by a bincode payload.

use crate::error::PubSubError;
use crate::pubsub::{AckType, Delivery, QueueType};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    // Client to broker
    Hello {
        protocol_version: u32,
        username: Option<String>,
    },
    DeclareAndBind {
        exchange: String,
        queue: String,
        binding_key: String,
        queue_type: QueueType,
    },
    Consume {
        queue: String,
    },
    Publish {
        exchange: String,
        routing_key: String,
        body: Vec<u8>,
    },
    Settle {
        queue: String,
        delivery_tag: u64,
        ack: AckType,
    },
    Goodbye,

    // Broker to client
    Welcome {
        connection_id: u64,
    },
    Deliver(Delivery),
    Error {
        reason: String,
    },
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), PubSubError>
where
    W: AsyncWrite + Unpin,
{
    let data = bincode::serialize(frame)?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(PubSubError::FrameTooLarge { size: data.len() });
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame, or `None` when the peer closed the stream cleanly
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, PubSubError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_SIZE {
        return Err(PubSubError::FrameTooLarge { size: len });
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(bincode::deserialize(&buffer)?))
}
