//! Append-only JSONL transcripts.
//!
//! Each conversation gets a `<conversationId>.jsonl` file. A committed turn
//! is one `append` call: the assistant's prose line and, when the turn
//! produced side-channel events, a replay line right after it, written
//! with a single `write_all`.
//!
//! Replay lines are a separate variant of [`TranscriptEntry`], so history
//! handed back to a model is built by dropping that variant rather than by
//! inspecting message text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sv_domain::error::{Error, Result};
use sv_domain::event::ChatEvent;
use sv_domain::tool::{Message, Role};
use sv_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a transcript line carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// A plain message; the only kind a model ever sees again.
    Prose { role: Role, content: String },
    /// Side-channel events of the preceding assistant message, kept so a
    /// client can re-render them.
    Replay { events: Vec<ChatEvent> },
}

/// A single transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub timestamp: DateTime<Utc>,
    /// Turn number; 0 is the opening message.
    pub turn: u32,
    #[serde(flatten)]
    pub entry: TranscriptEntry,
}

impl TranscriptLine {
    pub fn prose(turn: u32, role: Role, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            turn,
            entry: TranscriptEntry::Prose {
                role,
                content: content.into(),
            },
        }
    }

    pub fn replay(turn: u32, events: Vec<ChatEvent>) -> Self {
        Self {
            timestamp: Utc::now(),
            turn,
            entry: TranscriptEntry::Replay { events },
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self.entry, TranscriptEntry::Replay { .. })
    }

    /// The prose message, or `None` for a replay line.
    pub fn as_message(&self) -> Option<Message> {
        match &self.entry {
            TranscriptEntry::Prose { role, content } => Some(Message {
                role: *role,
                content: content.clone(),
            }),
            TranscriptEntry::Replay { .. } => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Writer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Cache = Arc<RwLock<HashMap<String, Vec<TranscriptLine>>>>;

/// Writes append-only JSONL transcript files with an in-memory write-through
/// cache so reads never hit disk after the first load.
///
/// Appends write the file and update the cache under the cache's write
/// lock, and a cold read loads the file under that same lock, so a read can
/// never cache a file an append is halfway through.
pub struct TranscriptWriter {
    base_dir: PathBuf,
    cache: Cache,
}

impl TranscriptWriter {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Append lines to a transcript (sync). Writes through to disk first;
    /// the cache is only updated if I/O succeeds.
    pub fn append(&self, key: &str, lines: &[TranscriptLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let buf = serialize_lines(lines)?;
        append_through(&self.cache, &self.path_for(key), key, &buf, lines)?;
        emit_append(key, lines.len());
        Ok(())
    }

    /// Append lines to a transcript (async), via `spawn_blocking`.
    pub async fn append_async(&self, key: &str, lines: &[TranscriptLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let buf = serialize_lines(lines)?;
        let cache = self.cache.clone();
        let path = self.path_for(key);
        let owned_key = key.to_owned();
        let owned_lines = lines.to_vec();

        tokio::task::spawn_blocking(move || {
            append_through(&cache, &path, &owned_key, &buf, &owned_lines)
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        emit_append(key, lines.len());
        Ok(())
    }

    /// Read back a transcript, prose and replay lines alike, in order.
    pub fn read(&self, key: &str) -> Result<Vec<TranscriptLine>> {
        load_through(&self.cache, &self.path_for(key), key)
    }

    /// Read back a transcript (async).
    pub async fn read_async(&self, key: &str) -> Result<Vec<TranscriptLine>> {
        if let Some(lines) = cached(&self.cache, key) {
            return Ok(lines);
        }

        let cache = self.cache.clone();
        let path = self.path_for(key);
        let owned_key = key.to_owned();
        tokio::task::spawn_blocking(move || load_through(&cache, &path, &owned_key))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    /// Prose-only history, safe to hand to a model.
    pub async fn prose_history(&self, key: &str) -> Result<Vec<Message>> {
        let lines = self.read_async(key).await?;
        Ok(lines.iter().filter_map(TranscriptLine::as_message).collect())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.jsonl"))
    }
}

// ── Cache-coherent file access ───────────────────────────────────────

fn cached(cache: &Cache, key: &str) -> Option<Vec<TranscriptLine>> {
    cache.read().get(key).cloned()
}

fn append_through(
    cache: &Cache,
    path: &Path,
    key: &str,
    buf: &str,
    lines: &[TranscriptLine],
) -> Result<()> {
    let mut cache = cache.write();
    write_all_append(path, buf)?;
    // Only extend an entry that was already loaded; otherwise the next
    // read pulls the whole file from disk.
    if let Some(entry) = cache.get_mut(key) {
        entry.extend(lines.iter().cloned());
    }
    Ok(())
}

fn load_through(cache: &Cache, path: &Path, key: &str) -> Result<Vec<TranscriptLine>> {
    if let Some(lines) = cached(cache, key) {
        return Ok(lines);
    }

    let mut cache = cache.write();
    if let Some(lines) = cache.get(key) {
        return Ok(lines.clone());
    }
    let lines = read_jsonl_file(path, key)?;
    cache.insert(key.to_owned(), lines.clone());
    Ok(lines)
}

fn emit_append(key: &str, lines: usize) {
    TraceEvent::TranscriptAppend {
        conversation_id: key.to_owned(),
        lines,
    }
    .emit();
}

/// Serialize transcript lines to a JSONL string.
fn serialize_lines(lines: &[TranscriptLine]) -> Result<String> {
    let mut buf = String::new();
    for line in lines {
        let json = serde_json::to_string(line)
            .map_err(|e| Error::Other(format!("serializing transcript line: {e}")))?;
        buf.push_str(&json);
        buf.push('\n');
    }
    Ok(buf)
}

fn write_all_append(path: &Path, buf: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::Io)?;
    file.write_all(buf.as_bytes()).map_err(Error::Io)?;
    Ok(())
}

/// Read and parse a JSONL transcript file.
fn read_jsonl_file(path: &Path, key: &str) -> Result<Vec<TranscriptLine>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut lines = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptLine>(line) {
            Ok(tl) => lines.push(tl),
            Err(e) => {
                tracing::warn!(conversation_id = key, error = %e, "skipping malformed transcript line");
            }
        }
    }
    Ok(lines)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
