//! JSONL training records with pre-computed audio codes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::FrameCodes;

/// Reference audio as written in a record: one entry or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefAudio {
    One(String),
    Many(Vec<String>),
}

impl RefAudio {
    /// The entry used for conditioning
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(s) => Some(s.as_str()),
            Self::Many(list) => list.first().map(String::as_str),
        }
    }
}

/// One line of a training JSONL file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Target audio the codes were computed from
    pub audio: String,
    pub text: String,
    /// `[frames][16]` codec indices
    pub audio_codes: FrameCodes,
    #[serde(default = "default_language")]
    pub language: String,
    pub ref_audio: RefAudio,
}

fn default_language() -> String {
    "Auto".to_string()
}

/// Read every record of a JSONL file.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<TrainingRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;
    let records =
        parse_jsonl(file).with_context(|| format!("Failed to load dataset {}", path.display()))?;
    tracing::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse JSONL from any reader; blank lines are skipped.
pub fn parse_jsonl<R: Read>(reader: R) -> Result<Vec<TrainingRecord>> {
    let mut records = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TrainingRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {}", i + 1))?;
        records.push(record);
    }
    Ok(records)
}
