use crate::utils::http::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_true() -> bool {
    true
}

// ── Request Limits ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    #[serde(default = "default_speed")]
    pub default_speed: f32,
    #[serde(default = "default_min_pitch")]
    pub min_pitch: i32,
    #[serde(default = "default_max_pitch")]
    pub max_pitch: i32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            default_speed: default_speed(),
            min_pitch: default_min_pitch(),
            max_pitch: default_max_pitch(),
        }
    }
}

fn default_max_text_length() -> usize {
    5000
}
fn default_min_speed() -> f32 {
    0.5
}
fn default_max_speed() -> f32 {
    2.0
}
fn default_speed() -> f32 {
    1.0
}
fn default_min_pitch() -> i32 {
    -20
}
fn default_max_pitch() -> i32 {
    20
}

impl Limits {
    /// Clamp a requested speed into range. Non-finite input falls back to the default.
    pub fn clamp_speed(&self, speed: Option<f32>) -> f32 {
        match speed {
            Some(s) if s.is_finite() => s.clamp(self.min_speed, self.max_speed),
            _ => self.default_speed,
        }
    }

    pub fn clamp_pitch(&self, pitch: Option<i32>) -> i32 {
        pitch.unwrap_or(0).clamp(self.min_pitch, self.max_pitch)
    }
}

// ── Languages & Voices ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageInfo {
    pub name: String,
    pub code: String,
}

fn default_languages() -> BTreeMap<String, LanguageInfo> {
    [
        ("bn", "Bengali"),
        ("hi", "Hindi"),
        ("mr", "Marathi"),
        ("gu", "Gujarati"),
        ("kn", "Kannada"),
        ("ml", "Malayalam"),
        ("pa", "Punjabi"),
        ("ur", "Urdu"),
        ("or", "Odia"),
        ("as", "Assamese"),
        ("ta", "Tamil"),
        ("te", "Telugu"),
        ("en", "English"),
    ]
    .into_iter()
    .map(|(code, name)| {
        (
            code.to_string(),
            LanguageInfo {
                name: name.to_string(),
                code: code.to_string(),
            },
        )
    })
    .collect()
}

/// Neural voice table keyed `<language>_<gender>`.
fn default_voices() -> BTreeMap<String, String> {
    [
        ("bn_male", "bn-BD-PradeepNeural"),
        ("bn_female", "bn-IN-TanishaaNeural"),
        ("hi_male", "hi-IN-MadhurNeural"),
        ("hi_female", "hi-IN-SwaraNeural"),
        ("en_male", "en-US-ChristopherNeural"),
        ("en_female", "en-US-AriaNeural"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PronunciationRule {
    pub from: String,
    pub to: String,
}

fn default_pronunciations() -> Vec<PronunciationRule> {
    vec![
        PronunciationRule {
            from: "BandhanNova".into(),
            to: "Bandhan Nova".into(),
        },
        PronunciationRule {
            from: "BandhaNova".into(),
            to: "Bandha Nova".into(),
        },
    ]
}

// ── Cache Config ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `<data dir>/speech-gateway/cache`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Advisory ceiling, reported but never enforced.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_size_mb: default_max_size_mb(),
        }
    }
}

fn default_max_size_mb() -> u64 {
    500
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| crate::config::app_data_dir().join("cache"))
    }
}

// ── Provider Configs ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCloningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// XTTS-style server root, e.g. `http://127.0.0.1:8020`. Unset disables the provider.
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default = "default_cloning_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for VoiceCloningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: default_cloning_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl VoiceCloningConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        crate::config::resolve_api_key(&self.api_key, &self.api_key_env)
    }
}

fn default_cloning_timeout_secs() -> u64 {
    300
}
fn default_probe_timeout_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralCloudConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit launcher (program + leading args). Skips detection when set.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_neural_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for NeuralCloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            timeout_secs: default_neural_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_neural_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoboticCloudConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_robotic_base_url")]
    pub base_url: String,
    #[serde(default = "default_robotic_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for RoboticCloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_robotic_base_url(),
            timeout_secs: default_robotic_timeout_secs(),
            max_chunk_chars: default_max_chunk_chars(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_robotic_base_url() -> String {
    "https://translate.google.com".to_string()
}
fn default_robotic_timeout_secs() -> u64 {
    30
}
fn default_max_chunk_chars() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_offline_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            timeout_secs: default_offline_timeout_secs(),
            words_per_minute: default_words_per_minute(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_offline_timeout_secs() -> u64 {
    60
}
fn default_words_per_minute() -> u32 {
    175
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub voice_cloning: VoiceCloningConfig,
    #[serde(default)]
    pub neural_cloud: NeuralCloudConfig,
    #[serde(default)]
    pub robotic_cloud: RoboticCloudConfig,
    #[serde(default)]
    pub offline: OfflineConfig,
}

// ── Streaming Config ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How long a streaming backend may take to produce its first chunk
    /// before the request falls back to buffered synthesis.
    #[serde(default = "default_first_chunk_timeout_ms")]
    pub first_chunk_timeout_ms: u64,
    /// Longest gap allowed between later chunks before the stream is ended
    /// with a timeout error.
    #[serde(default = "default_chunk_idle_timeout_ms")]
    pub chunk_idle_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            first_chunk_timeout_ms: default_first_chunk_timeout_ms(),
            chunk_idle_timeout_ms: default_chunk_idle_timeout_ms(),
        }
    }
}

fn default_channel_capacity() -> usize {
    32
}
fn default_first_chunk_timeout_ms() -> u64 {
    15_000
}
fn default_chunk_idle_timeout_ms() -> u64 {
    15_000
}

impl StreamingConfig {
    pub fn first_chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.first_chunk_timeout_ms)
    }

    pub fn chunk_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_idle_timeout_ms)
    }
}

// ── Top-Level System Config ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSystemConfig {
    #[serde(default)]
    pub limits: Limits,
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, LanguageInfo>,
    #[serde(default = "default_voices")]
    pub voices: BTreeMap<String, String>,
    #[serde(default = "default_pronunciations")]
    pub pronunciations: Vec<PronunciationRule>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

impl Default for TtsSystemConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            languages: default_languages(),
            voices: default_voices(),
            pronunciations: default_pronunciations(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl TtsSystemConfig {
    pub fn is_supported_language(&self, code: &str) -> bool {
        self.languages.contains_key(code)
    }
}

/// Load TTS config from a JSON file. Falls back to defaults if file is missing or invalid.
pub fn load_config(path: &Path) -> TtsSystemConfig {
    crate::config::load_json_config(path, "TTS")
}

/// Save TTS config to a JSON file.
pub fn save_config(path: &Path, config: &TtsSystemConfig) -> Result<(), String> {
    crate::config::save_json_config(path, config, "TTS")
}
