//! HuggingFace Hub downloads for the files the packer needs.
//!
//! Only the model `config.json` (control tokens) and the text tokenizer are
//! fetched; no weights are required to build training batches. Enable with
//! the `hub` feature.
//!
//! ```rust,ignore
//! use qwen3_tts_finetune::hub::ModelFiles;
//!
//! let files = ModelFiles::download(None)?;
//! let control = ControlTokens::from_file(&files.config)?;
//! ```

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use std::path::PathBuf;

/// Default HuggingFace model IDs
pub mod model_ids {
    /// Base checkpoint; carries config.json and the Qwen2 vocab files
    pub const BASE: &str = "Qwen/Qwen3-TTS-12Hz-0.6B-Base";
}

/// Where a downloaded tokenizer lives
#[derive(Debug, Clone)]
pub enum TokenizerFiles {
    /// A single `tokenizer.json`
    Json(PathBuf),
    /// Directory holding `vocab.json`, `merges.txt` and `tokenizer_config.json`
    VocabAndMerges(PathBuf),
}

impl TokenizerFiles {
    pub fn download(model_id: &str) -> Result<Self> {
        let api = Api::new().context("Failed to create HuggingFace API")?;
        tracing::info!("Downloading tokenizer from HuggingFace Hub: {}", model_id);
        fetch_tokenizer(&api.model(model_id.to_string()), model_id)
    }
}

fn fetch_tokenizer(repo: &ApiRepo, model_id: &str) -> Result<TokenizerFiles> {
    if let Ok(file) = repo.get("tokenizer.json") {
        return Ok(TokenizerFiles::Json(file));
    }

    let vocab = repo
        .get("vocab.json")
        .map_err(|e| anyhow!("Failed to download tokenizer from '{}': {}", model_id, e))?;
    repo.get("merges.txt")
        .map_err(|e| anyhow!("Failed to download merges from '{}': {}", model_id, e))?;
    // Registers the chat markers as atomic tokens
    repo.get("tokenizer_config.json").map_err(|e| {
        anyhow!(
            "Failed to download tokenizer_config.json from '{}': {}",
            model_id,
            e
        )
    })?;

    let dir = vocab
        .parent()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Downloaded vocab.json has no parent directory"))?;
    Ok(TokenizerFiles::VocabAndMerges(dir))
}

/// Download only the model `config.json`
pub fn download_config(model_id: &str) -> Result<PathBuf> {
    let api = Api::new().context("Failed to create HuggingFace API")?;
    tracing::info!("Downloading config from HuggingFace Hub: {}", model_id);
    api.model(model_id.to_string())
        .get("config.json")
        .with_context(|| format!("Failed to download config.json from '{}'", model_id))
}

/// Paths to the downloaded configuration and tokenizer.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Model `config.json`
    pub config: PathBuf,
    pub tokenizer: TokenizerFiles,
}

impl ModelFiles {
    /// Download from `model_id` (default [`model_ids::BASE`]) into the HF cache.
    pub fn download(model_id: Option<&str>) -> Result<Self> {
        let api = Api::new().context("Failed to create HuggingFace API")?;
        let model_id = model_id.unwrap_or(model_ids::BASE);

        tracing::info!("Downloading packing files for {}", model_id);
        let repo = api.model(model_id.to_string());
        Self::fetch(&repo, model_id)
    }

    /// Download at a specific git revision (branch, tag, or commit hash)
    pub fn download_revision(model_id: &str, revision: &str) -> Result<Self> {
        let api = Api::new().context("Failed to create HuggingFace API")?;

        tracing::info!("Downloading {} @ {}", model_id, revision);
        let repo = api.repo(hf_hub::Repo::with_revision(
            model_id.to_string(),
            hf_hub::RepoType::Model,
            revision.to_string(),
        ));
        Self::fetch(&repo, model_id)
    }

    fn fetch(repo: &ApiRepo, model_id: &str) -> Result<Self> {
        let config = repo
            .get("config.json")
            .context("Failed to download config.json")?;
        let tokenizer = fetch_tokenizer(repo, model_id)?;
        Ok(Self { config, tokenizer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert!(model_ids::BASE.starts_with("Qwen/Qwen3-TTS"));
    }
}
