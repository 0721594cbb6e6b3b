//! Append-only log of notifications abandoned after exhausting their attempts.
//!
//! The dispatcher never reads this file back; it exists for operators.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use lineboom_common::error::AppError;
use lineboom_common::types::{DeadLetter, QueuedNotification};

pub struct DeadLetterLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DeadLetterLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        notification: QueuedNotification,
        abandoned_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut line = serde_json::to_string(&DeadLetter {
            notification,
            abandoned_at,
        })?;
        line.push('\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}
