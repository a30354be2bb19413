use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::time::sleep;

use super::event::InputEvent;
use super::parser::{parse_input_file, InputFormat};
use super::source::InputSource;

const PROCESSED_DIR: &str = "processed";

/// Polls a directory for `<task_id>.json|.md|.txt` files.
///
/// Accepted files are moved into `processed/`. Rejected files stay where they
/// are and are remembered by modification time, so only a changed file is
/// parsed again.
pub struct DirectoryInputSource {
    dir: PathBuf,
    poll_interval: Duration,
    queue: VecDeque<InputEvent>,
    queued: HashSet<PathBuf>,
    rejected: HashMap<PathBuf, Option<SystemTime>>,
}

impl DirectoryInputSource {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            rejected: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.dir.join(PROCESSED_DIR)
    }

    /// One pass over the directory. New, parseable files are queued in file
    /// name order; returns how many were queued.
    pub async fn scan(&mut self) -> anyhow::Result<usize> {
        if !self.dir.exists() {
            tokio::fs::create_dir_all(&self.dir).await?;
        }

        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(true);
            if hidden {
                continue;
            }
            candidates.push((path, metadata.modified().ok()));
        }
        candidates.sort();

        let mut queued = 0;
        for (path, modified) in candidates {
            if self.queued.contains(&path) {
                continue;
            }
            if self.rejected.get(&path) == Some(&modified) {
                continue;
            }

            let known_extension = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(InputFormat::from_extension)
                .is_some();
            if !known_extension {
                tracing::debug!(path = %path.display(), "ignoring file with unsupported extension");
                self.rejected.insert(path, modified);
                continue;
            }

            match parse_input_file(&path, None).await {
                Ok(event) => {
                    tracing::debug!(path = %path.display(), task_id = %event.task_id, "input file queued");
                    self.rejected.remove(&path);
                    self.queued.insert(path);
                    self.queue.push_back(event);
                    queued += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring malformed input file");
                    self.rejected.insert(path, modified);
                }
            }
        }

        Ok(queued)
    }

    async fn move_to_processed(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let processed = self.processed_dir();
        tokio::fs::create_dir_all(&processed).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let mut target = processed.join(&file_name);

        if target.exists() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("dat");
            let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
            target = processed.join(format!("{stem}.{stamp}.{ext}"));
        }

        tokio::fs::rename(path, &target).await?;
        Ok(target)
    }
}

#[async_trait]
impl InputSource for DirectoryInputSource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn next_event(&mut self) -> Option<InputEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }

            if let Err(err) = self.scan().await {
                tracing::warn!(dir = %self.dir.display(), error = %err, "input directory scan failed");
            }
            if !self.queue.is_empty() {
                continue;
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn acknowledge(&mut self, event: &InputEvent) {
        let Some(path) = event.source.as_deref() else {
            return;
        };
        self.queued.remove(path);

        match self.move_to_processed(path).await {
            Ok(target) => {
                tracing::info!(task_id = %event.task_id, to = %target.display(), "input file processed")
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to move processed input");
            }
        }
    }

    async fn reject(&mut self, event: &InputEvent, reason: &str) {
        let Some(path) = event.source.as_deref() else {
            return;
        };
        self.queued.remove(path);

        let modified = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        self.rejected.insert(path.to_path_buf(), modified);
        tracing::warn!(path = %path.display(), reason, "input file rejected, left in place");
    }
}
