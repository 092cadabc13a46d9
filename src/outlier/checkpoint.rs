//! Trainer checkpoints on disk
//!
//! A checkpoint is a bincode envelope carrying a CRC32 of its payload. Files
//! are written to a temporary sibling, synced and renamed into place.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use super::model::ModelState;
use super::nn::AdamState;

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Everything needed to resume training or reuse a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerCheckpoint {
    pub model: ModelState,
    pub optimizer: AdamState,
    pub train_losses: Vec<f64>,
    pub test_losses: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointEnvelope {
    schema_version: u32,
    created_at: DateTime<Utc>,
    payload_crc32: u32,
    payload: Vec<u8>,
}

impl CheckpointEnvelope {
    fn verify(&self) -> PipelineResult<()> {
        if self.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(PipelineError::Checkpoint(format!(
                "unsupported schema_version {}; expected {}",
                self.schema_version, CHECKPOINT_SCHEMA_VERSION
            )));
        }

        let observed = crc32fast::hash(&self.payload);
        if observed != self.payload_crc32 {
            return Err(PipelineError::Checkpoint(format!(
                "payload crc32 mismatch: expected=0x{:08x}, observed=0x{:08x}",
                self.payload_crc32, observed
            )));
        }
        Ok(())
    }
}

pub fn encode(checkpoint: &TrainerCheckpoint) -> PipelineResult<Vec<u8>> {
    let payload = bincode::serialize(checkpoint)
        .map_err(|e| PipelineError::Checkpoint(format!("payload serialization failed: {}", e)))?;

    let envelope = CheckpointEnvelope {
        schema_version: CHECKPOINT_SCHEMA_VERSION,
        created_at: Utc::now(),
        payload_crc32: crc32fast::hash(&payload),
        payload,
    };

    bincode::serialize(&envelope)
        .map_err(|e| PipelineError::Checkpoint(format!("envelope serialization failed: {}", e)))
}

pub fn decode(bytes: &[u8]) -> PipelineResult<TrainerCheckpoint> {
    let envelope: CheckpointEnvelope = bincode::deserialize(bytes)
        .map_err(|e| PipelineError::Checkpoint(format!("envelope parse failed: {}", e)))?;
    envelope.verify()?;

    bincode::deserialize(&envelope.payload)
        .map_err(|e| PipelineError::Checkpoint(format!("payload parse failed: {}", e)))
}

pub fn save(checkpoint: &TrainerCheckpoint, path: &Path) -> PipelineResult<()> {
    let bytes = encode(checkpoint)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PipelineError::Checkpoint(format!("invalid checkpoint path '{}'", path.display()))
        })?;
    let temp_path = path.with_file_name(format!("{}.tmp-{}", file_name, std::process::id()));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;

    let written = file.write_all(&bytes).and_then(|_| file.sync_all());
    if let Err(err) = written.and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Checkpoint saved");
    Ok(())
}

pub fn load(path: &Path) -> PipelineResult<TrainerCheckpoint> {
    let bytes = fs::read(path)?;
    let checkpoint = decode(&bytes)?;
    tracing::info!(path = %path.display(), "Checkpoint loaded");
    Ok(checkpoint)
}
