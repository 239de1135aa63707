//! Memory port and the file-backed store.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::core::digest::MemoryDigest;
use crate::core::types::{MemoryRecord, is_valid_user_id};

/// Cross-session memory for a user.
///
/// Appends are at-least-once and last-write-wins; there is no cross-run lock.
pub trait MemoryStore: Sync {
    fn fetch(&self, user_id: &str) -> Result<MemoryRecord>;
    fn append(&self, user_id: &str, digest: &MemoryDigest) -> Result<()>;
}

impl<M: MemoryStore + ?Sized> MemoryStore for &M {
    fn fetch(&self, user_id: &str) -> Result<MemoryRecord> {
        (**self).fetch(user_id)
    }

    fn append(&self, user_id: &str, digest: &MemoryDigest) -> Result<()> {
        (**self).append(user_id, digest)
    }
}

/// One JSON-lines file per user under `dir`.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    dir: PathBuf,
    recall_limit: usize,
}

impl FileMemoryStore {
    pub fn new(dir: impl Into<PathBuf>, recall_limit: usize) -> Self {
        Self {
            dir: dir.into(),
            recall_limit,
        }
    }

    fn user_path(&self, user_id: &str) -> Result<PathBuf> {
        if !is_valid_user_id(user_id) {
            bail!("invalid user id {user_id:?}");
        }
        Ok(self.dir.join(format!("{user_id}.jsonl")))
    }
}

impl MemoryStore for FileMemoryStore {
    fn fetch(&self, user_id: &str) -> Result<MemoryRecord> {
        let path = self.user_path(user_id)?;
        if !path.exists() {
            return Ok(MemoryRecord::empty(user_id));
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read memory {}", path.display()))?;
        let digests = parse_lines(&path, &contents);
        let skip = digests.len().saturating_sub(self.recall_limit);
        let entries: Vec<String> = digests.iter().skip(skip).map(MemoryDigest::render).collect();
        debug!(user_entries = digests.len(), recalled = entries.len(), "memory fetched");
        Ok(MemoryRecord {
            user_id: user_id.to_string(),
            entries,
        })
    }

    fn append(&self, user_id: &str, digest: &MemoryDigest) -> Result<()> {
        let path = self.user_path(user_id)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create memory dir {}", self.dir.display()))?;
        let mut line = serde_json::to_string(digest).context("serialize memory digest")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open memory {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append memory {}", path.display()))?;
        Ok(())
    }
}

/// Parse digest lines, skipping ones that no longer decode.
fn parse_lines(path: &Path, contents: &str) -> Vec<MemoryDigest> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(digest) => Some(digest),
            Err(err) => {
                warn!(path = %path.display(), line = idx + 1, err = %err, "skipping unreadable memory entry");
                None
            }
        })
        .collect()
}
