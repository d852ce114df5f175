//! Qwen2 BPE tokenizer producing the text channel of a training example

use anyhow::{anyhow, Result};
use std::path::Path;
use tokenizers::Tokenizer;

/// Pre-tokenizer regex of the Qwen2 fast tokenizer.
const PRETOKENIZE_REGEX: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Leading chat-control tokens kept at the head of every training example:
/// `<|im_start|>`, `assistant`, `\n`.
pub const CHAT_PREFIX_TOKENS: usize = 3;

/// Trailing tokens of the assistant template dropped before packing:
/// `<|im_end|>`, `\n`, `<|im_start|>`, `assistant`, `\n`.
pub const CHAT_SUFFIX_TOKENS: usize = 5;

/// Head of the assistant template; must encode to exactly [`CHAT_PREFIX_TOKENS`] IDs.
const CHAT_HEAD: &str = "<|im_start|>assistant\n";

const IM_START: &str = "<|im_start|>";

/// Wrap utterance text in the assistant-turn template used for training.
pub fn build_assistant_text(text: &str) -> String {
    format!("<|im_start|>assistant\n{text}<|im_end|>\n<|im_start|>assistant\n")
}

/// Text tokenizer wrapping HuggingFace tokenizers
#[derive(Debug)]
pub struct TextTokenizer {
    tokenizer: Tokenizer,
}

impl TextTokenizer {
    /// Load from a `tokenizer.json` path, a model directory, or a Hub repo ID.
    ///
    /// Directories are searched for `tokenizer.json` first, then for the
    /// `vocab.json` + `merges.txt` pair shipped with Qwen3-TTS checkpoints.
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let path = Path::new(model_id);

        if path.is_file() {
            return Self::from_file(path);
        }
        if path.join("tokenizer.json").exists() {
            return Self::from_file(path.join("tokenizer.json"));
        }
        if path.join("vocab.json").exists() && path.join("merges.txt").exists() {
            tracing::info!(
                "Building tokenizer from vocab.json + merges.txt in '{}'",
                model_id
            );
            return Self::from_vocab_and_merges(path);
        }
        if path.is_dir() {
            anyhow::bail!(
                "No tokenizer files found in '{}'. Expected tokenizer.json or vocab.json + merges.txt.",
                model_id
            );
        }

        #[cfg(feature = "hub")]
        {
            let files = crate::hub::TokenizerFiles::download(model_id)?;
            match files {
                crate::hub::TokenizerFiles::Json(file) => Self::from_file(file),
                crate::hub::TokenizerFiles::VocabAndMerges(dir) => Self::from_vocab_and_merges(&dir),
            }
        }

        #[cfg(not(feature = "hub"))]
        Err(anyhow!(
            "No tokenizer found at '{}' and hub feature is disabled",
            model_id
        ))
    }

    /// Assemble the Qwen2 byte-level BPE pipeline from `vocab.json` + `merges.txt`.
    pub fn from_vocab_and_merges(dir: &Path) -> Result<Self> {
        use tokenizers::models::bpe::BPE;
        use tokenizers::normalizers::unicode::NFC;
        use tokenizers::pre_tokenizers::byte_level::ByteLevel;
        use tokenizers::pre_tokenizers::sequence::Sequence;
        use tokenizers::pre_tokenizers::split::Split;
        use tokenizers::SplitDelimiterBehavior;

        let vocab_path = dir.join("vocab.json");
        let merges_path = dir.join("merges.txt");

        // Chat markers must be atomic or the template prefix is not 3 tokens
        let config_path = dir.join("tokenizer_config.json");
        if !config_path.exists() {
            anyhow::bail!(
                "No tokenizer_config.json in {}; it is required to register the chat markers",
                dir.display()
            );
        }

        let bpe = BPE::from_file(
            &vocab_path.to_string_lossy(),
            &merges_path.to_string_lossy(),
        )
        .unk_token("<|endoftext|>".to_string())
        .byte_fallback(false)
        .build()
        .map_err(|e| anyhow!("Failed to build BPE from {}: {}", dir.display(), e))?;

        let mut tokenizer = Tokenizer::new(bpe);
        tokenizer.with_normalizer(Some(NFC));

        let split = Split::new(PRETOKENIZE_REGEX, SplitDelimiterBehavior::Isolated, false)
            .map_err(|e| anyhow!("Failed to create Split pre-tokenizer: {}", e))?;
        let byte_level = ByteLevel::new(false, false, false);
        tokenizer.with_pre_tokenizer(Some(Sequence::new(vec![split.into(), byte_level.into()])));
        tokenizer.with_post_processor(Some(ByteLevel::new(false, false, false)));
        tokenizer.with_decoder(Some(ByteLevel::new(false, false, false)));

        add_special_tokens_from_config(&mut tokenizer, &config_path)?;

        Ok(Self::from_tokenizer(tokenizer))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(Self::from_tokenizer(tokenizer))
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Encode text without post-processor special tokens
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Failed to encode text: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// The three chat-control IDs that open every training example.
    ///
    /// Fails unless `<|im_start|>` is a single vocabulary token and the
    /// template head encodes to exactly [`CHAT_PREFIX_TOKENS`] IDs.
    pub fn chat_prefix(&self) -> Result<Vec<u32>> {
        let im_start = self
            .token_to_id(IM_START)
            .ok_or_else(|| anyhow!("Tokenizer has no {} token", IM_START))?;
        let ids = self.encode(CHAT_HEAD)?;
        if ids.len() != CHAT_PREFIX_TOKENS || ids[0] != im_start {
            anyhow::bail!(
                "Chat template head {:?} encodes to {:?}, expected {} tokens starting with {}",
                CHAT_HEAD,
                ids,
                CHAT_PREFIX_TOKENS,
                im_start
            );
        }
        Ok(ids)
    }

    /// Token IDs of one utterance as the packer expects them.
    ///
    /// Encodes the assistant template and drops its trailing
    /// [`CHAT_SUFFIX_TOKENS`], leaving the three chat-control tokens followed
    /// by the utterance content. Fails if the encoding does not start with
    /// [`chat_prefix`](Self::chat_prefix).
    pub fn encode_for_training(&self, text: &str) -> Result<Vec<u32>> {
        let prefix = self.chat_prefix()?;
        let mut ids = self.encode(&build_assistant_text(text))?;
        if ids.len() < CHAT_SUFFIX_TOKENS + CHAT_PREFIX_TOKENS {
            anyhow::bail!(
                "Assistant template for {:?} encoded to only {} tokens",
                text,
                ids.len()
            );
        }
        if ids[..CHAT_PREFIX_TOKENS] != prefix[..] {
            anyhow::bail!(
                "Assistant template for {:?} starts with {:?}, expected chat prefix {:?}",
                text,
                &ids[..CHAT_PREFIX_TOKENS],
                prefix
            );
        }
        ids.truncate(ids.len() - CHAT_SUFFIX_TOKENS);
        Ok(ids)
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow!("Failed to decode tokens: {}", e))
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

/// Register the `added_tokens_decoder` entries of `tokenizer_config.json`
/// (`<|im_start|>`, `<|im_end|>`, `<tts_pad>`, ...) as special tokens.
fn add_special_tokens_from_config(tokenizer: &mut Tokenizer, config_path: &Path) -> Result<()> {
    use tokenizers::AddedToken;

    let content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
    let config: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse {}: {}", config_path.display(), e))?;

    let Some(added_tokens) = config
        .get("added_tokens_decoder")
        .and_then(|v| v.as_object())
    else {
        return Ok(());
    };

    let flag = |info: &serde_json::Value, key: &str| info.get(key).and_then(|v| v.as_bool());
    let special_tokens: Vec<AddedToken> = added_tokens
        .values()
        .filter(|info| flag(info, "special").unwrap_or(false))
        .filter_map(|info| {
            let content = info.get("content")?.as_str()?;
            let mut token = AddedToken::from(content, true);
            if let Some(v) = flag(info, "lstrip") {
                token = token.lstrip(v);
            }
            if let Some(v) = flag(info, "rstrip") {
                token = token.rstrip(v);
            }
            if let Some(v) = flag(info, "normalized") {
                token = token.normalized(v);
            }
            if let Some(v) = flag(info, "single_word") {
                token = token.single_word(v);
            }
            Some(token)
        })
        .collect();

    if !special_tokens.is_empty() {
        tracing::debug!(
            "Adding {} special tokens from tokenizer_config.json",
            special_tokens.len()
        );
        tokenizer.add_special_tokens(&special_tokens);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenizers::models::bpe::BPE;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;
    use tokenizers::AddedToken;

    /// Character-level BPE with atomic chat markers
    fn create_test_tokenizer() -> TextTokenizer {
        let vocab: [(&str, u32); 10] = [
            ("<|im_start|>", 0),
            ("<|im_end|>", 1),
            ("assistant", 2),
            ("\n", 3),
            ("h", 4),
            ("i", 5),
            ("a", 6),
            ("b", 7),
            ("c", 8),
            ("[UNK]", 9),
        ];
        let merges: Vec<(String, String)> = vec![];
        let bpe = BPE::builder()
            .vocab_and_merges(vocab.map(|(k, v)| (k.to_string(), v)), merges)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();

        let mut tokenizer = Tokenizer::new(bpe);
        tokenizer.with_pre_tokenizer(Some(Whitespace));
        tokenizer.add_special_tokens(&[
            AddedToken::from("<|im_start|>", true),
            AddedToken::from("<|im_end|>", true),
        ]);
        tokenizer.add_tokens(&[
            AddedToken::from("assistant", false),
            AddedToken::from("\n", false),
        ]);
        TextTokenizer::from_tokenizer(tokenizer)
    }

    #[test]
    fn test_build_assistant_text() {
        assert_eq!(
            build_assistant_text("hi"),
            "<|im_start|>assistant\nhi<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_encode_full_template() {
        let tokenizer = create_test_tokenizer();
        let ids = tokenizer.encode(&build_assistant_text("hi ab")).unwrap();
        assert_eq!(ids, vec![0, 2, 3, 4, 5, 6, 7, 1, 3, 0, 2, 3]);
    }

    #[test]
    fn test_encode_for_training_trims_suffix() {
        let tokenizer = create_test_tokenizer();
        let ids = tokenizer.encode_for_training("hi ab").unwrap();
        assert_eq!(ids, vec![0, 2, 3, 4, 5, 6, 7]);
        // The chat prefix does not depend on content
        let other = tokenizer.encode_for_training("c").unwrap();
        assert_eq!(other[..CHAT_PREFIX_TOKENS], ids[..CHAT_PREFIX_TOKENS]);
        assert_eq!(other.len(), CHAT_PREFIX_TOKENS + 1);
    }

    #[test]
    fn test_encode_for_training_empty_text() {
        let tokenizer = create_test_tokenizer();
        let ids = tokenizer.encode_for_training("").unwrap();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn test_chat_prefix() {
        let tokenizer = create_test_tokenizer();
        assert_eq!(tokenizer.chat_prefix().unwrap(), vec![0, 2, 3]);
    }

    #[test]
    fn test_split_chat_markers_rejected() {
        // No added tokens: `<|im_start|>` falls apart into character pieces
        let vocab: [(&str, u32); 4] = [("<", 0), ("|", 1), (">", 2), ("[UNK]", 3)];
        let merges: Vec<(String, String)> = vec![];
        let bpe = BPE::builder()
            .vocab_and_merges(vocab.map(|(k, v)| (k.to_string(), v)), merges)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(bpe);
        tokenizer.with_pre_tokenizer(Some(Whitespace));
        let tokenizer = TextTokenizer::from_tokenizer(tokenizer);

        assert!(tokenizer.chat_prefix().is_err());
        let err = tokenizer.encode_for_training("hi").unwrap_err();
        assert!(err.to_string().contains("<|im_start|>"));
    }

    #[test]
    fn test_vocab_and_merges_requires_tokenizer_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.json"), r#"{"a": 0, "b": 1}"#).unwrap();
        std::fs::write(dir.path().join("merges.txt"), "#version: 0.2\n").unwrap();

        let err = TextTokenizer::from_pretrained(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("tokenizer_config.json"));
    }

    #[test]
    fn test_token_lookup() {
        let tokenizer = create_test_tokenizer();
        assert_eq!(tokenizer.token_to_id("<|im_start|>"), Some(0));
        assert_eq!(tokenizer.token_to_id("assistant"), Some(2));
        assert_eq!(tokenizer.token_to_id("nonexistent"), None);
    }

    #[test]
    fn test_decode_empty() {
        let tokenizer = create_test_tokenizer();
        assert!(tokenizer.decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_from_pretrained_nonexistent() {
        assert!(TextTokenizer::from_pretrained("/nonexistent/path").is_err());
    }

    #[test]
    fn test_from_pretrained_dir_no_tokenizer_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = TextTokenizer::from_pretrained(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("No tokenizer files found"));
    }

    #[test]
    fn test_from_pretrained_tokenizer_json() {
        let dir = tempfile::tempdir().unwrap();
        let original = create_test_tokenizer();
        original
            .tokenizer
            .save(dir.path().join("tokenizer.json"), false)
            .unwrap();

        let loaded = TextTokenizer::from_pretrained(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            loaded.encode_for_training("hi").unwrap(),
            original.encode_for_training("hi").unwrap()
        );
    }

    #[test]
    fn test_special_tokens_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("tokenizer_config.json");
        std::fs::write(
            &config_path,
            r#"{"added_tokens_decoder": {
                "0": {"content": "<|im_start|>", "special": true, "lstrip": false},
                "1": {"content": "<|im_end|>", "special": true},
                "2": {"content": "plain", "special": false}
            }}"#,
        )
        .unwrap();

        let vocab: [(&str, u32); 3] = [("<|im_start|>", 0), ("<|im_end|>", 1), ("x", 2)];
        let merges: Vec<(String, String)> = vec![];
        let bpe = BPE::builder()
            .vocab_and_merges(vocab.map(|(k, v)| (k.to_string(), v)), merges)
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(bpe);
        tokenizer.with_pre_tokenizer(Some(Whitespace));
        add_special_tokens_from_config(&mut tokenizer, &config_path).unwrap();

        let text = TextTokenizer::from_tokenizer(tokenizer);
        assert_eq!(text.encode("<|im_start|>x<|im_end|>").unwrap(), vec![0, 2, 1]);
    }
}
