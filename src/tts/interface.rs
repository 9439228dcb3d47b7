use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

// ── Error Types ────────────────────────────────────────

/// A request the gateway refuses before any cache or provider work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Text cannot be empty")]
    EmptyText,
    #[error("Text too long ({length} characters). Maximum {max} characters allowed")]
    TextTooLong { length: usize, max: usize },
    #[error("Language {0} not supported")]
    UnsupportedLanguage(String),
}

/// Failure of a single backend. Recovered by advancing the chain.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider returned no audio")]
    EmptyOutput,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One failed provider attempt, kept for the terminal error report.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider_id, self.error)
    }
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("All TTS providers failed [{}]", summarize(.attempts))]
    Synthesis { attempts: Vec<ProviderFailure> },
}

impl TtsError {
    /// Client-side mistake (maps to a 4xx in an HTTP front end).
    pub fn is_validation(&self) -> bool {
        matches!(self, TtsError::Validation(_))
    }

    pub fn is_terminal_synthesis(&self) -> bool {
        matches!(self, TtsError::Synthesis { .. })
    }
}

fn summarize(attempts: &[ProviderFailure]) -> String {
    if attempts.is_empty() {
        return "no provider could handle the request".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Audio ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 2] = [AudioFormat::Mp3, AudioFormat::Wav];

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

/// A complete audio payload with its container tag.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

// ── Capability Flags ───────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderCapabilities {
    pub supports_streaming: bool,
    pub supports_speed: bool,
    pub supports_cloning: bool,
    pub requires_network: bool,
}

// ── Voice Profiles ─────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub language: String,
    pub gender: Gender,
}

// ── Synthesis Parameters ───────────────────────────────

/// A validated, normalized request as handed to providers.
///
/// `text` has already been through the normalizer and `speed`/`pitch` are
/// clamped to the configured limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub voice: Option<String>,
    pub speed: f32,
    pub pitch: i32,
    pub speaker_sample: Option<PathBuf>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: None,
            speed: 1.0,
            pitch: 0,
            speaker_sample: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_speaker_sample(mut self, sample: impl Into<PathBuf>) -> Self {
        self.speaker_sample = Some(sample.into());
        self
    }
}

/// Incremental provider output. Items arrive in playback order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ProviderError>> + Send>>;

// ── Provider Trait ──────────────────────────────────────

#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Unique identifier for this provider (e.g., "neural_cloud", "offline")
    fn id(&self) -> String;

    /// Declare what this provider can do
    fn capabilities(&self) -> ProviderCapabilities;

    /// Result of the one-time availability probe done at construction.
    fn is_available(&self) -> bool;

    /// Whether this provider applies to the request at all.
    fn can_handle(&self, request: &SynthesisRequest) -> bool;

    /// Synthesize the whole request into one buffer.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError>;

    /// Container format of the chunks produced by `synthesize_stream`.
    fn stream_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    /// Streaming synthesis — returns chunks incrementally.
    /// Default implementation falls back to non-streaming `synthesize`.
    async fn synthesize_stream(&self, request: &SynthesisRequest) -> Result<ChunkStream, ProviderError> {
        let audio = self.synthesize(request).await?;
        let stream = futures::stream::once(async move { Ok(audio.data) });
        Ok(Box::pin(stream))
    }
}
