//! Durable notification queue backed by a JSONL file.
//!
//! Every pending notification is one JSON object per line. New records are
//! appended; status changes (retry scheduled, delivered, abandoned) rewrite the
//! whole file through a temp file + rename so a crash never leaves a half
//! written log behind.
//!
//! All file mutations are serialized by a single mutex. The in-memory vector is
//! only updated after the corresponding write succeeded, so memory and disk
//! never diverge on an I/O error.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use lineboom_common::error::AppError;
use lineboom_common::types::QueuedNotification;

/// Owned handle on the durable queue file.
pub struct QueueStore {
    path: PathBuf,
    records: Mutex<Vec<QueuedNotification>>,
}

/// Outcome of replaying a queue file.
#[derive(Debug, Default)]
struct Replay {
    records: Vec<QueuedNotification>,
    /// Lines that failed to parse
    skipped: usize,
    /// Records whose id was already seen earlier in the log
    duplicates: usize,
}

impl QueueStore {
    /// Open the queue file, creating it (and its parent directory) if needed,
    /// and reload every live record.
    ///
    /// Malformed lines are skipped with a warning. If any line was dropped, or
    /// the last line lacks its newline terminator, the file is compacted
    /// immediately so the next append starts on a fresh line.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let replay = replay(&contents);
        let unterminated = !contents.is_empty() && !contents.ends_with('\n');

        // Fail fast if the file cannot be written to.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(
            path = %path.display(),
            pending = replay.records.len(),
            skipped = replay.skipped,
            duplicates = replay.duplicates,
            "Notification queue loaded"
        );

        let store = Self {
            path,
            records: Mutex::new(Vec::new()),
        };

        {
            let mut records = store.records.lock().await;
            if unterminated || replay.skipped > 0 || replay.duplicates > 0 {
                store.rewrite(&replay.records).await?;
            }
            *records = replay.records;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new record to the log.
    ///
    /// A failed write may leave a partial line behind; the log is then rebuilt
    /// from memory so the next append does not land on the torn line.
    pub async fn append(&self, record: QueuedNotification) -> Result<(), AppError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut records = self.records.lock().await;

        if let Err(e) = self.append_line(&line).await {
            if let Err(repair) = self.rewrite(&records).await {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %repair,
                    "Failed to repair queue after append error"
                );
            }
            return Err(e);
        }

        tracing::debug!(
            notification_id = %record.id,
            recipient = %record.target,
            "Notification appended to queue"
        );

        records.push(record);
        Ok(())
    }

    /// Replace an existing record (matched by id) and compact the log.
    ///
    /// Returns `false` if no record with that id is queued.
    pub async fn update(&self, record: QueuedNotification) -> Result<bool, AppError> {
        let mut records = self.records.lock().await;

        let Some(pos) = records.iter().position(|r| r.id == record.id) else {
            return Ok(false);
        };

        let mut next = records.clone();
        next[pos] = record;
        self.rewrite(&next).await?;
        *records = next;
        Ok(true)
    }

    /// Remove a record (delivered or abandoned) and compact the log.
    pub async fn remove(&self, id: Uuid) -> Result<Option<QueuedNotification>, AppError> {
        let mut records = self.records.lock().await;

        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };

        let mut next = records.clone();
        let removed = next.remove(pos);
        self.rewrite(&next).await?;
        *records = next;
        Ok(Some(removed))
    }

    /// All pending records in log order (oldest enqueued first).
    pub async fn snapshot(&self) -> Vec<QueuedNotification> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<QueuedNotification> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Rewrite the log from memory and release the store.
    pub async fn close(self) -> Result<(), AppError> {
        let records = self.records.lock().await;
        self.rewrite(&records).await?;
        tracing::info!(
            path = %self.path.display(),
            pending = records.len(),
            "Notification queue closed"
        );
        Ok(())
    }

    async fn append_line(&self, line: &str) -> Result<(), AppError> {
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

    /// Atomically replace the log with `records`. Caller must hold the lock.
    async fn rewrite(&self, records: &[QueuedNotification]) -> Result<(), AppError> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let tmp = temp_path(&self.path);
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "queue".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Rebuild the queue from log contents.
///
/// A repeated id keeps the position of its first occurrence and the contents of
/// its last one.
fn replay(contents: &str) -> Replay {
    let mut replay = Replay::default();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<QueuedNotification>(line) {
            Ok(record) => match index.get(&record.id) {
                Some(&pos) => {
                    replay.records[pos] = record;
                    replay.duplicates += 1;
                }
                None => {
                    index.insert(record.id, replay.records.len());
                    replay.records.push(record);
                }
            },
            Err(e) => {
                tracing::warn!(
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed queue record"
                );
                replay.skipped += 1;
            }
        }
    }

    replay
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(target: &str) -> QueuedNotification {
        QueuedNotification::new(target, format!("hello {}", target), Utc::now())
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let good = record("a");
        let contents = format!(
            "{}\nnot json at all\n\n{{\"id\":\"truncated\n",
            serde_json::to_string(&good).unwrap()
        );
        let replay = replay(&contents);
        assert_eq!(replay.records, vec![good]);
        assert_eq!(replay.skipped, 2);
        assert_eq!(replay.duplicates, 0);
    }

    #[test]
    fn test_replay_dedupes_by_id() {
        let first = record("a");
        let second = record("b");
        let mut first_retry = first.clone();
        first_retry.attempts = 2;

        let contents = [&first, &second, &first_retry]
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        let replay = replay(&contents);
        assert_eq!(replay.duplicates, 1);
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.records[0].id, first.id);
        assert_eq!(replay.records[0].attempts, 2);
        assert_eq!(replay.records[1].id, second.id);
    }

    #[tokio::test]
    async fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.jsonl");

        let store = QueueStore::open(&path).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_append_grows_log_by_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let store = QueueStore::open(&path).await.unwrap();

        store.append(record("a")).await.unwrap();
        assert_eq!(line_count(&path), 1);
        store.append(record("b")).await.unwrap();
        assert_eq!(line_count(&path), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_update_and_remove_compact_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        let store = QueueStore::open(&path).await.unwrap();

        let a = record("a");
        let b = record("b");
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();

        let mut a_retry = a.clone();
        a_retry.attempts = 1;
        assert!(store.update(a_retry).await.unwrap());
        assert_eq!(line_count(&path), 2);
        assert_eq!(store.get(a.id).await.unwrap().attempts, 1);

        let removed = store.remove(b.id).await.unwrap().unwrap();
        assert_eq!(removed.id, b.id);
        assert_eq!(line_count(&path), 1);
        assert!(store.remove(b.id).await.unwrap().is_none());
        assert!(!path.with_file_name("queue.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::open(dir.path().join("queue.jsonl"))
            .await
            .unwrap();
        assert!(!store.update(record("ghost")).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reopen_recovers_same_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");

        let a = record("a");
        let b = record("b");
        {
            let store = QueueStore::open(&path).await.unwrap();
            store.append(a.clone()).await.unwrap();
            store.append(b.clone()).await.unwrap();
            store.close().await.unwrap();
        }

        let store = QueueStore::open(&path).await.unwrap();
        assert_eq!(store.snapshot().await, vec![a, b]);
    }

    #[tokio::test]
    async fn test_open_compacts_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");

        let good = record("a");
        std::fs::write(
            &path,
            format!("garbage\n{}\n", serde_json::to_string(&good).unwrap()),
        )
        .unwrap();

        let store = QueueStore::open(&path).await.unwrap();
        assert_eq!(store.snapshot().await, vec![good]);
        assert_eq!(line_count(&path), 1);
    }

    #[tokio::test]
    async fn test_append_after_unterminated_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");

        let a = record("a");
        std::fs::write(&path, serde_json::to_string(&a).unwrap()).unwrap();

        let b = record("b");
        {
            let store = QueueStore::open(&path).await.unwrap();
            store.append(b.clone()).await.unwrap();
            // dropped without close, as after a crash
        }

        assert_eq!(line_count(&path), 2);
        let store = QueueStore::open(&path).await.unwrap();
        assert_eq!(store.snapshot().await, vec![a, b]);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let path = sub.join("queue.jsonl");

        let store = QueueStore::open(&path).await.unwrap();
        let a = record("a");
        store.append(a.clone()).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        let err = store.append(record("b")).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(store.snapshot().await, vec![a]);
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/var/lib/lineboom/queue.jsonl"));
        assert_eq!(tmp, PathBuf::from("/var/lib/lineboom/queue.jsonl.tmp"));
    }
}
