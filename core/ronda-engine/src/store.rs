//! File-backed persistence for finalized rounds and the channel index.
//!
//! # File Format
//!
//! Both stores are versioned JSON documents:
//!
//! ```json
//! { "version": 1, "rounds": { "01ROUND...": { ... RoundRecord fields ... } } }
//! { "version": 1, "subjects": { "banco central": { "3": { ... record ... } } } }
//! ```
//!
//! # Defensive Design
//!
//! The document store is shared with the dashboard process, so loading
//! handles empty files, corrupt JSON, and version mismatches by returning an
//! empty store with a warning instead of failing. Saves go through a temp
//! file + rename so a crash never leaves a partial document behind.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;
use ronda_model::{
    normalize_subject_key, ChannelStatus, HistoricalChannelRecord, RoundRecord, SourceKind,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

const ROUNDS_VERSION: u32 = 1;
const INDEX_VERSION: u32 = 1;

fn atomic_save(file_path: &Path, content: &str) -> Result<(), String> {
    let parent_dir = file_path
        .parent()
        .ok_or_else(|| "Store path has no parent directory".to_string())?;
    fs::create_dir_all(parent_dir).map_err(|e| format!("Failed to create store dir: {}", e))?;
    let mut temp_file =
        NamedTempFile::new_in(parent_dir).map_err(|e| format!("Temp file error: {}", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write temp store file: {}", e))?;
    temp_file
        .flush()
        .map_err(|e| format!("Failed to flush temp store file: {}", e))?;
    temp_file
        .persist(file_path)
        .map_err(|e| format!("Failed to write store file: {}", e.error))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Round store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct RoundsFile {
    version: u32,
    rounds: HashMap<String, RoundRecord>,
}

impl Default for RoundsFile {
    fn default() -> Self {
        RoundsFile {
            version: ROUNDS_VERSION,
            rounds: HashMap::new(),
        }
    }
}

/// Finalized round records keyed by round id.
///
/// Create with [`RoundStore::load`] to read from disk, or
/// [`RoundStore::new_in_memory`] for tests.
pub struct RoundStore {
    rounds: HashMap<String, RoundRecord>,
    file_path: Option<PathBuf>,
}

impl RoundStore {
    pub fn new_in_memory() -> Self {
        RoundStore {
            rounds: HashMap::new(),
            file_path: None,
        }
    }

    pub fn new(file_path: &Path) -> Self {
        RoundStore {
            rounds: HashMap::new(),
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn load(file_path: &Path) -> Self {
        if !file_path.exists() {
            return RoundStore::new(file_path);
        }

        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, path = %file_path.display(), "Failed to read round store");
                return RoundStore::new(file_path);
            }
        };

        if content.trim().is_empty() {
            return RoundStore::new(file_path);
        }

        match serde_json::from_str::<RoundsFile>(&content) {
            Ok(file) if file.version == ROUNDS_VERSION => RoundStore {
                rounds: file.rounds,
                file_path: Some(file_path.to_path_buf()),
            },
            Ok(file) => {
                warn!(
                    version = file.version,
                    expected = ROUNDS_VERSION,
                    "Unsupported round store version, starting empty"
                );
                RoundStore::new(file_path)
            }
            Err(err) => {
                warn!(error = %err, "Corrupt round store, starting empty");
                RoundStore::new(file_path)
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let file_path = self
            .file_path
            .as_ref()
            .ok_or_else(|| "No file path set for in-memory store".to_string())?;

        let file = RoundsFile {
            version: ROUNDS_VERSION,
            rounds: self.rounds.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| format!("Failed to serialize round store: {}", e))?;
        atomic_save(file_path, &content)
    }

    pub fn is_file_backed(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn upsert(&mut self, record: RoundRecord) {
        self.rounds.insert(record.round.id.clone(), record);
    }

    pub fn get(&self, round_id: &str) -> Option<&RoundRecord> {
        self.rounds.get(round_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &RoundRecord> {
        self.rounds.values()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Most recently finalized round containing the given subject.
    ///
    /// Ties on `end_time` break on round id so repeated queries stay
    /// deterministic.
    pub fn latest_for_subject(&self, subject_key: &str) -> Option<&RoundRecord> {
        self.rounds
            .values()
            .filter(|record| {
                record.round.end_time.is_some()
                    && record
                        .round
                        .work_items
                        .iter()
                        .any(|item| normalize_subject_key(&item.subject) == subject_key)
            })
            .max_by(|a, b| {
                a.round
                    .end_time
                    .cmp(&b.round.end_time)
                    .then_with(|| a.round.id.cmp(&b.round.id))
            })
    }

    /// Channel records from the latest finalized round for a subject, in the
    /// shape the resolver consumes as its FinalizedRound source.
    pub fn finalized_records_for(&self, subject_key: &str) -> Vec<HistoricalChannelRecord> {
        let Some(record) = self.latest_for_subject(subject_key) else {
            return Vec::new();
        };
        let Some(end_time) = record.round.end_time else {
            return Vec::new();
        };

        record
            .round
            .work_items
            .iter()
            .filter(|item| normalize_subject_key(&item.subject) == subject_key)
            .flat_map(|item| item.channels.iter())
            .filter(|channel| channel.status.is_set())
            .map(|channel| HistoricalChannelRecord {
                subject_key: subject_key.to_string(),
                channel: channel.number,
                status: channel.status,
                updated_at: end_time,
                source: SourceKind::FinalizedRound,
                round_id: Some(record.round.id.clone()),
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel index store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    subjects: HashMap<String, BTreeMap<u32, HistoricalChannelRecord>>,
}

impl Default for IndexFile {
    fn default() -> Self {
        IndexFile {
            version: INDEX_VERSION,
            subjects: HashMap::new(),
        }
    }
}

/// Cross-round aggregate of last-known channel status per subject.
///
/// Upserts merge per `(subject key, channel number)`: writing one channel
/// never disturbs the subject's other channels.
pub struct IndexStore {
    subjects: HashMap<String, BTreeMap<u32, HistoricalChannelRecord>>,
    file_path: Option<PathBuf>,
}

impl IndexStore {
    pub fn new_in_memory() -> Self {
        IndexStore {
            subjects: HashMap::new(),
            file_path: None,
        }
    }

    pub fn new(file_path: &Path) -> Self {
        IndexStore {
            subjects: HashMap::new(),
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn load(file_path: &Path) -> Self {
        if !file_path.exists() {
            return IndexStore::new(file_path);
        }

        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, path = %file_path.display(), "Failed to read channel index");
                return IndexStore::new(file_path);
            }
        };

        if content.trim().is_empty() {
            return IndexStore::new(file_path);
        }

        match serde_json::from_str::<IndexFile>(&content) {
            Ok(file) if file.version == INDEX_VERSION => IndexStore {
                subjects: file.subjects,
                file_path: Some(file_path.to_path_buf()),
            },
            Ok(file) => {
                warn!(
                    version = file.version,
                    expected = INDEX_VERSION,
                    "Unsupported channel index version, starting empty"
                );
                IndexStore::new(file_path)
            }
            Err(err) => {
                warn!(error = %err, "Corrupt channel index, starting empty");
                IndexStore::new(file_path)
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let file_path = self
            .file_path
            .as_ref()
            .ok_or_else(|| "No file path set for in-memory store".to_string())?;

        let file = IndexFile {
            version: INDEX_VERSION,
            subjects: self.subjects.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| format!("Failed to serialize channel index: {}", e))?;
        atomic_save(file_path, &content)
    }

    pub fn is_file_backed(&self) -> bool {
        self.file_path.is_some()
    }

    /// Merge-writes one channel's last-known status. The store assigns the
    /// timestamp; callers pass the round that produced the status (if any)
    /// for provenance.
    pub fn upsert(
        &mut self,
        subject_key: &str,
        channel: u32,
        status: ChannelStatus,
        round_id: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.subjects.entry(subject_key.to_string()).or_default().insert(
            channel,
            HistoricalChannelRecord {
                subject_key: subject_key.to_string(),
                channel,
                status,
                updated_at: at,
                source: SourceKind::PersistedIndex,
                round_id,
            },
        );
    }

    pub fn get(&self, subject_key: &str, channel: u32) -> Option<&HistoricalChannelRecord> {
        self.subjects.get(subject_key)?.get(&channel)
    }

    /// All records for a subject, ascending by channel number.
    pub fn records_for(&self, subject_key: &str) -> Vec<HistoricalChannelRecord> {
        self.subjects
            .get(subject_key)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }
}
