use super::interface::{Gender, VoiceProfile};
use std::collections::BTreeMap;

/// Static (language, gender) → neural voice table, consulted once per request.
#[derive(Debug, Clone, Default)]
pub struct VoiceRegistry {
    voices: BTreeMap<(String, Gender), String>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config entries keyed `<language>_<gender>` (e.g. `bn_female`).
    pub fn from_table(table: &BTreeMap<String, String>) -> Self {
        let mut registry = Self::new();
        for (key, voice_id) in table {
            let parsed = key
                .rsplit_once('_')
                .and_then(|(lang, gender)| gender.parse::<Gender>().ok().map(|g| (lang, g)));
            match parsed {
                Some((lang, gender)) => registry.register(lang, gender, voice_id),
                None => tracing::warn!("[TTS/Voices] Ignoring malformed voice key '{}'", key),
            }
        }
        registry
    }

    /// Register a voice. Overwrites an existing (language, gender) entry.
    pub fn register(&mut self, language: &str, gender: Gender, voice_id: &str) {
        self.voices
            .insert((language.to_string(), gender), voice_id.to_string());
    }

    pub fn get(&self, language: &str, gender: Gender) -> Option<&str> {
        self.voices
            .get(&(language.to_string(), gender))
            .map(String::as_str)
    }

    /// An explicit selector wins; otherwise look up (language, gender).
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        language: &str,
        gender: Option<Gender>,
    ) -> Option<String> {
        if let Some(voice) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
            return Some(voice.to_string());
        }
        gender.and_then(|g| self.get(language, g)).map(String::from)
    }

    /// List all registered voices.
    pub fn list(&self) -> Vec<VoiceProfile> {
        self.voices
            .iter()
            .map(|((language, gender), voice_id)| VoiceProfile {
                voice_id: voice_id.clone(),
                language: language.clone(),
                gender: *gender,
            })
            .collect()
    }

    /// Find voices by language code (e.g., "en", "bn").
    pub fn find_by_language(&self, lang: &str) -> Vec<VoiceProfile> {
        self.list()
            .into_iter()
            .filter(|v| v.language == lang)
            .collect()
    }
}
