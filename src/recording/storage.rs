// Copyright (c) 2024 Mike Tsao

use crate::types::{AudioCommand, Seconds};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

/// Describes a recording session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionMetadata {
    #[allow(missing_docs)]
    pub name: String,
    /// The latest `start_at` recorded.
    pub duration: Seconds,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}
impl SessionMetadata {
    #[allow(missing_docs)]
    pub fn new_with(name: &str) -> Self {
        let now = Self::now_ms();
        Self {
            name: name.to_string(),
            duration: Seconds::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a new duration and bumps `updated_at`.
    pub fn touch(&mut self, duration: Seconds) {
        self.duration = if duration.is_finite() && duration.0 > 0.0 {
            duration
        } else {
            Seconds::zero()
        };
        self.updated_at = Self::now_ms().max(self.created_at);
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Somewhere a recorder can persist events as they arrive. The recorder calls
/// these synchronously and logs failures; it never propagates them.
pub trait RecordingStorage: core::fmt::Debug + Send {
    /// Appends one event.
    fn add_event(&mut self, command: &AudioCommand) -> anyhow::Result<()>;

    /// Replaces the session metadata.
    fn write_metadata(&mut self, metadata: &SessionMetadata) -> anyhow::Result<()>;

    /// Forgets everything stored.
    fn clear(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct MemoryStorageContents {
    events: Vec<AudioCommand>,
    metadata: Option<SessionMetadata>,
}

/// Keeps everything in memory. Clones share the same contents, so you can
/// give one to a recorder and inspect another.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    contents: Arc<Mutex<MemoryStorageContents>>,
}
impl MemoryStorage {
    /// A copy of every stored event.
    pub fn events(&self) -> Vec<AudioCommand> {
        self.contents
            .lock()
            .map(|c| c.events.clone())
            .unwrap_or_default()
    }

    /// The last metadata written, if any.
    pub fn metadata(&self) -> Option<SessionMetadata> {
        self.contents.lock().ok().and_then(|c| c.metadata.clone())
    }

    fn with_contents<T>(&self, f: impl FnOnce(&mut MemoryStorageContents) -> T) -> anyhow::Result<T> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock was poisoned"))?;
        Ok(f(&mut contents))
    }
}
impl RecordingStorage for MemoryStorage {
    fn add_event(&mut self, command: &AudioCommand) -> anyhow::Result<()> {
        self.with_contents(|c| c.events.push(command.clone()))
    }

    fn write_metadata(&mut self, metadata: &SessionMetadata) -> anyhow::Result<()> {
        self.with_contents(|c| c.metadata = Some(metadata.clone()))
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.with_contents(|c| {
            c.events.clear();
            c.metadata = None;
        })
    }
}

/// Stores a session in a directory: one JSON event per line in
/// `events.jsonl`, and the metadata in `session.json`.
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
}
impl JsonFileStorage {
    const EVENTS_FILENAME: &'static str = "events.jsonl";
    const METADATA_FILENAME: &'static str = "session.json";

    /// Uses `dir`, creating it if needed.
    pub fn new_with(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn events_path(&self) -> PathBuf {
        self.dir.join(Self::EVENTS_FILENAME)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(Self::METADATA_FILENAME)
    }

    /// Reads back every stored event, in order.
    pub fn load_events(&self) -> anyhow::Result<Vec<AudioCommand>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::default());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut r = Vec::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            r.push(
                serde_json::from_str(&line)
                    .with_context(|| format!("{} line {}", path.display(), i + 1))?,
            );
        }
        Ok(r)
    }

    /// Reads back the session metadata, if it has been written.
    pub fn load_metadata(&self) -> anyhow::Result<Option<SessionMetadata>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
impl RecordingStorage for JsonFileStorage {
    fn add_event(&mut self, command: &AudioCommand) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())?;
        let mut line = serde_json::to_string(command)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn write_metadata(&mut self, metadata: &SessionMetadata) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(self.metadata_path(), json)?;
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        for path in [self.events_path(), self.metadata_path()] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
        }
        Ok(())
    }
}
