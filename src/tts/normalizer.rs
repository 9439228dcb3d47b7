//! Text normalization applied before cache-key computation and synthesis.
//!
//! Three passes, in order:
//!   1. brand-name pronunciation fixes (case-insensitive)
//!   2. acronym spelling: standalone `[A-Z]{2,4}` tokens become `R O I`
//!   3. whitespace collapse + trim
//!
//! Brand fixes run first because a correction may introduce new tokens.

use super::config::PronunciationRule;
use regex::{Captures, NoExpand, Regex};
use std::sync::LazyLock;

static RE_ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,4}\b").expect("acronym pattern is valid"));
static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static DEFAULT_NORMALIZER: LazyLock<TextNormalizer> = LazyLock::new(TextNormalizer::default);

struct CompiledRule {
    pattern: Regex,
    replacement: String,
}

pub struct TextNormalizer {
    rules: Vec<CompiledRule>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(&super::config::TtsSystemConfig::default().pronunciations)
    }
}

impl TextNormalizer {
    pub fn new(rules: &[PronunciationRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| !rule.from.is_empty())
            .filter_map(|rule| {
                match Regex::new(&format!("(?i){}", regex::escape(&rule.from))) {
                    Ok(pattern) => Some(CompiledRule {
                        pattern,
                        replacement: rule.to.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(
                            "[TTS/Normalize] Skipping pronunciation rule '{}': {}",
                            rule.from,
                            e
                        );
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// Normalize `text` for synthesis. Acronym spelling applies to every
    /// language since English abbreviations show up in Indic text too.
    pub fn normalize(&self, text: &str, _language: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule
                .pattern
                .replace_all(&out, NoExpand(&rule.replacement))
                .into_owned();
        }

        let out = expand_acronyms(&out);
        RE_WHITESPACE.replace_all(&out, " ").trim().to_string()
    }
}

/// Space out 2–4 letter all-caps tokens so they are read letter by letter.
pub fn expand_acronyms(text: &str) -> String {
    RE_ACRONYM
        .replace_all(text, |caps: &Captures| {
            let acronym = &caps[0];
            acronym
                .chars()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .into_owned()
}

/// Normalize with the built-in pronunciation dictionary.
pub fn normalize(text: &str, language: &str) -> String {
    DEFAULT_NORMALIZER.normalize(text, language)
}
