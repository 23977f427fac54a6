// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the tokenizer that turns sentences
// into encoder ids.
//
// Without a pretrained model a word-level vocabulary is built
// from the training texts. The tokenizer JSON is written by
// hand and loaded back, which sidesteps the trainer type
// mismatch in tokenizers 0.15.
//
// Word counts come from the same BertNormalizer + Whitespace
// components the tokenizer encodes with (lowercase, accents
// stripped, CJK chars split), so every training word maps to
// its own id rather than [UNK].
//
// Special tokens take the lowest ids so every id stays below
// the encoder's vocab_size:
//   [PAD]=0  [UNK]=1  [CLS]=2  [SEP]=3  [MASK]=4  words from 5
//
// Word ids follow descending frequency, ties broken
// alphabetically, so the same corpus always gives the same
// vocabulary.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tokenizers::{
    normalizers::bert::BertNormalizer,
    pre_tokenizers::whitespace::Whitespace,
    Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer,
};

pub const TOKENIZER_FILE: &str = "tokenizer.json";

const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the stored tokenizer, or build one from `texts` and store it.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            let tokenizer = build_word_level(texts, vocab_size)?;
            self.save(&tokenizer)?;
            Ok(tokenizer)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }
}

fn normalizer() -> BertNormalizer {
    // clean_text, handle_chinese_chars, strip_accents (None: follow lowercase), lowercase
    BertNormalizer::new(true, true, None, true)
}

/// The pieces `text` encodes to before the vocabulary lookup.
fn word_pieces(normalizer: &BertNormalizer, pre_tokenizer: &Whitespace, text: &str) -> Result<Vec<String>> {
    let mut pretokenized = PreTokenizedString::from(text);
    pretokenized
        .normalize(|s| normalizer.normalize(s))
        .map_err(|e| anyhow::anyhow!("Cannot normalize '{text}': {e}"))?;
    pre_tokenizer
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| anyhow::anyhow!("Cannot pre-tokenize '{text}': {e}"))?;
    Ok(pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(piece, _, _)| piece.to_string())
        .collect())
}

/// Word-level tokenizer over the `vocab_size - 5` most frequent pieces.
pub fn build_word_level(texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
    let normalizer    = normalizer();
    let pre_tokenizer = Whitespace::default();

    let mut freq: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for piece in word_pieces(&normalizer, &pre_tokenizer, text)? {
            *freq.entry(piece).or_insert(0) += 1;
        }
    }

    let mut words: Vec<(String, usize)> = freq
        .into_iter()
        .filter(|(w, _)| !SPECIAL_TOKENS.contains(&w.as_str()))
        .collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

    let mut vocab = serde_json::Map::new();
    for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
        vocab.insert(token.to_string(), serde_json::json!(id));
    }
    for (offset, (word, _)) in words.iter().enumerate() {
        vocab.insert(word.clone(), serde_json::json!(SPECIAL_TOKENS.len() + offset));
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| serde_json::json!({
            "id": id, "content": token, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        }))
        .collect();

    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": serde_json::to_value(&normalizer)?,
        "pre_tokenizer": serde_json::to_value(&pre_tokenizer)?,
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    let bytes = serde_json::to_vec(&tokenizer_json)?;
    let tokenizer = Tokenizer::from_bytes(bytes)
        .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))?;
    tracing::info!("Tokenizer built with {} entries", SPECIAL_TOKENS.len() + words.len());
    Ok(tokenizer)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_ids_and_frequency_order() {
        let texts = vec!["b a b".to_string(), "c b a".to_string()];
        let tok = build_word_level(&texts, 32).unwrap();
        assert_eq!(tok.token_to_id("[PAD]"), Some(0));
        assert_eq!(tok.token_to_id("[CLS]"), Some(2));
        assert_eq!(tok.token_to_id("[SEP]"), Some(3));
        assert_eq!(tok.token_to_id("b"), Some(5));
        assert_eq!(tok.token_to_id("a"), Some(6));
        assert_eq!(tok.token_to_id("c"), Some(7));
    }

    #[test]
    fn test_vocab_is_capped() {
        let texts = vec!["one two three four five six".to_string()];
        let tok = build_word_level(&texts, 7).unwrap();
        assert_eq!(tok.get_vocab_size(true), 7);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = build_word_level(&["Hello world".to_string()], 32).unwrap();
        let ids = tok.encode("hello mars", false).unwrap().get_ids().to_vec();
        assert_eq!(ids, vec![tok.token_to_id("hello").unwrap(), 1]);
    }

    #[test]
    fn test_punctuation_is_split() {
        let got = word_pieces(&normalizer(), &Whitespace::default(), "Hello, World!").unwrap();
        assert_eq!(got, vec!["hello", ",", "world", "!"]);
    }

    #[test]
    fn test_accented_and_cjk_words_get_their_own_ids() {
        let texts = vec!["Café über Straße".to_string(), "東京 naïve".to_string()];
        let tok = build_word_level(&texts, 32).unwrap();
        let unk = tok.token_to_id("[UNK]").unwrap();
        for text in &texts {
            let ids = tok.encode(text.as_str(), false).unwrap().get_ids().to_vec();
            assert!(!ids.is_empty());
            assert!(!ids.contains(&unk), "{text} -> {ids:?}");
        }
        assert!(tok.token_to_id("cafe").is_some());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        assert!(!store.exists());
        let built = store.load_or_build(&["x y z".to_string()], 16).unwrap();
        assert!(store.exists());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.token_to_id("y"), built.token_to_id("y"));
    }
}
