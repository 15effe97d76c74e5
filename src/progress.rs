use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Stable de-duplication key for an address: SHA-256 of the trimmed,
/// lowercased full address, hex encoded. Survives cosmetic formatting
/// differences between runs.
pub fn address_dedup_key(full_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_address.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Counters for one logical job, cumulative across resumed runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub properties_found: u64,
    pub homeowners_found: u64,
    pub with_phone: u64,
    pub with_mobile: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub average_score: f64,
    pub high_priority: u64,
    pub medium_priority: u64,
    pub low_priority: u64,
    pub api_requests: u64,
    pub estimated_credits: f64,
}

/// One successfully imported record; the ledger is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub record_id: String,
    pub address: String,
    pub dedup_key: String,
    pub score: u32,
    pub processed_at: DateTime<Utc>,
}

/// One logged error; the error log is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub context: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable run state. Ledger and counters are monotonically non-decreasing
/// across resumed runs of the same job; a crash loses at most the in-flight
/// batch since the last save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunProgress {
    pub counters: RunCounters,
    #[serde(default)]
    pub ledger: Vec<LedgerEntry>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RunProgress {
    /// Record a successful import, keeping the running average in step.
    pub fn record_import(&mut self, record_id: &str, address: &str, score: u32) {
        let entry = LedgerEntry {
            record_id: record_id.to_string(),
            address: address.to_string(),
            dedup_key: address_dedup_key(address),
            score,
            processed_at: Utc::now(),
        };
        self.ledger.push(entry);
        self.counters.imported += 1;
        let n = self.counters.imported as f64;
        self.counters.average_score += (score as f64 - self.counters.average_score) / n;
    }

    pub fn record_error(&mut self, context: &str, message: &str) {
        tracing::error!("[{}] {}", context, message);
        self.errors.push(ErrorEntry {
            context: context.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Most recent errors, newest first, for operator echo at run end.
    pub fn top_errors(&self, limit: usize) -> Vec<ErrorEntry> {
        self.errors.iter().rev().take(limit).cloned().collect()
    }
}

/// On-disk envelope: the serialized progress plus a SHA-256 checksum so a
/// torn or tampered checkpoint is detected on load instead of resuming from
/// garbage.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEnvelope {
    data: String,
    checksum: String,
}

impl CheckpointEnvelope {
    fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }
}

/// Durable key/value checkpoint of run state. Owned exclusively by the
/// orchestrator; never accessed concurrently.
pub struct ProgressStore {
    path: PathBuf,
    pub progress: RunProgress,
    seen_dedup_keys: HashSet<String>,
}

impl ProgressStore {
    /// Load the checkpoint at `path`. A missing file is a fresh run, not an
    /// error; a corrupt or checksum-mismatched file is logged and also
    /// treated as fresh.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let progress = match std::fs::read_to_string(&path) {
            Ok(raw) => match parse_checkpoint(&raw) {
                Some(progress) => {
                    tracing::info!(
                        "Resuming from checkpoint {:?}: {} imported, {} errors",
                        path,
                        progress.counters.imported,
                        progress.errors.len()
                    );
                    progress
                }
                None => {
                    tracing::warn!(
                        "Checkpoint {:?} is corrupt or failed checksum validation, starting fresh",
                        path
                    );
                    RunProgress::default()
                }
            },
            Err(_) => {
                tracing::info!("No checkpoint at {:?}, starting fresh run", path);
                RunProgress::default()
            }
        };

        let seen_dedup_keys = progress
            .ledger
            .iter()
            .map(|e| e.dedup_key.clone())
            .collect();

        Self {
            path,
            progress,
            seen_dedup_keys,
        }
    }

    /// True when this address was already imported by any prior run.
    pub fn is_already_imported(&self, dedup_key: &str) -> bool {
        self.seen_dedup_keys.contains(dedup_key)
    }

    /// Record a successful import in the ledger and the dedup index.
    pub fn record_import(&mut self, record_id: &str, address: &str, score: u32) {
        self.progress.record_import(record_id, address, score);
        self.seen_dedup_keys.insert(address_dedup_key(address));
    }

    /// Flush to disk: serialize, wrap in the checksum envelope, write to a
    /// temp file, and rename into place so a crash mid-write never corrupts
    /// the previous checkpoint.
    pub fn save(&mut self) -> Result<(), AppError> {
        self.progress.updated_at = Some(Utc::now());

        let data = serde_json::to_string_pretty(&self.progress)
            .map_err(|e| AppError::Checkpoint(format!("serialize failed: {e}")))?;
        let envelope = CheckpointEnvelope::new(data);
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Checkpoint(format!("serialize failed: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, payload)
            .map_err(|e| AppError::Checkpoint(format!("write {:?} failed: {e}", tmp_path)))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            AppError::Checkpoint(format!("rename {:?} -> {:?} failed: {e}", tmp_path, self.path))
        })?;

        tracing::debug!("Checkpoint saved to {:?}", self.path);
        Ok(())
    }
}

fn parse_checkpoint(raw: &str) -> Option<RunProgress> {
    let envelope: CheckpointEnvelope = serde_json::from_str(raw).ok()?;
    if !envelope.is_valid() {
        tracing::warn!(
            "Checkpoint checksum mismatch (expected {}, data length {})",
            envelope.checksum,
            envelope.data.len()
        );
        return None;
    }
    serde_json::from_str(&envelope.data).ok()
}
