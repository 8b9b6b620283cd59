//! Payload encodings used on the broker channels.
//!
//! Game events travel as field-tagged JSON so any consumer can read them.
//! Game logs use bincode, which is compact but requires both ends to agree
//! on the exact struct layout.

use crate::error::PubSubError;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Binary,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Binary => "application/x-bincode",
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, PubSubError> {
        match self {
            Encoding::Json => Ok(serde_json::to_vec(value)?),
            Encoding::Binary => Ok(bincode::serialize(value)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, PubSubError> {
        match self {
            Encoding::Json => Ok(serde_json::from_slice(body)?),
            Encoding::Binary => Ok(bincode::deserialize(body)?),
        }
    }
}
