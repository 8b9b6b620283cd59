//! Append-only game log kept by the server

use log::{error, info};
use shared::{AckType, GameLogEntry};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const DEFAULT_LOG_FILE: &str = "game.log";

/// Writes one line per entry; concurrent writers are serialized
pub struct GameLogWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl GameLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &GameLogEntry) -> io::Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format_entry(entry).as_bytes()).await?;
        file.flush().await
    }

    /// Subscription handler for the game-log queue
    pub async fn handle(&self, entry: GameLogEntry) -> AckType {
        info!("[{}] {}", entry.username, entry.message);
        match self.append(&entry).await {
            Ok(()) => AckType::Ack,
            Err(e) => {
                error!("Failed to write game log to {}: {}", self.path.display(), e);
                AckType::NackRequeue
            }
        }
    }
}

pub fn format_entry(entry: &GameLogEntry) -> String {
    format!("{} {}: {}\n", entry.timestamp, entry.username, entry.message)
}
