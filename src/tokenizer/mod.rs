//! Text tokenization for Qwen3-TTS training examples
//!
//! Uses HuggingFace's tokenizers library (written in Rust) for
//! Qwen2TokenizerFast compatibility.

mod text;

pub use text::{build_assistant_text, TextTokenizer, CHAT_PREFIX_TOKENS, CHAT_SUFFIX_TOKENS};
