use super::cache::{CacheUsage, DiskCache, Fingerprint};
use super::chain::ProviderChain;
use super::config::{LanguageInfo, TtsSystemConfig};
use super::interface::{
    AudioFormat, Gender, ProviderCapabilities, ProviderError, ProviderFailure, SynthesisRequest,
    TtsError, TtsProvider, ValidationError, VoiceProfile,
};
use super::neural_cloud::NeuralCloudProvider;
use super::normalizer::TextNormalizer;
use super::offline::OfflineProvider;
use super::robotic_cloud::RoboticCloudProvider;
use super::stream::{self, AudioStream};
use super::voice_cloning::VoiceCloningProvider;
use super::voice_registry::VoiceRegistry;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

// ── Request ────────────────────────────────────────────

/// A caller's synthesis request, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
    pub speed: Option<f32>,
    /// Explicit voice id; wins over the (language, gender) table.
    pub voice: Option<String>,
    pub gender: Option<Gender>,
    pub pitch: Option<i32>,
    /// Reference audio for voice cloning.
    pub speaker_sample: Option<PathBuf>,
    pub stream: bool,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_pitch(mut self, pitch: i32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_speaker_sample(mut self, sample: impl Into<PathBuf>) -> Self {
        self.speaker_sample = Some(sample.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

// ── Response ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "provider")]
pub enum AudioSource {
    Cache,
    Provider(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub data: Vec<u8>,
    pub format: AudioFormat,
    pub source: AudioSource,
}

impl AudioBuffer {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Debug)]
pub enum AudioResult {
    Buffered(AudioBuffer),
    Streamed(AudioStream),
}

impl AudioResult {
    pub fn format(&self) -> AudioFormat {
        match self {
            AudioResult::Buffered(buffer) => buffer.format,
            AudioResult::Streamed(stream) => stream.format(),
        }
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self, AudioResult::Streamed(_))
    }

    /// Full audio payload, draining the stream if there is one.
    pub async fn into_bytes(self) -> Result<Vec<u8>, ProviderError> {
        match self {
            AudioResult::Buffered(buffer) => Ok(buffer.data),
            AudioResult::Streamed(stream) => stream.collect_bytes().await,
        }
    }
}

// ── Status Queries ─────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub available: bool,
    pub capabilities: ProviderCapabilities,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub model_name: String,
    /// A neural or cloned voice can be produced.
    pub human_like: bool,
    pub online: bool,
    pub offline_available: bool,
    pub languages: Vec<String>,
}

// ── TtsService ─────────────────────────────────────────

/// Synthesis entry point: validate → normalize → cache → provider chain.
///
/// Built once and cloned into whatever serves requests; all state is
/// immutable after construction.
#[derive(Clone)]
pub struct TtsService {
    config: Arc<TtsSystemConfig>,
    normalizer: Arc<TextNormalizer>,
    voices: Arc<VoiceRegistry>,
    chain: Arc<ProviderChain>,
    cache: Option<DiskCache>,
}

impl TtsService {
    pub fn new(config: TtsSystemConfig, chain: ProviderChain, cache: Option<DiskCache>) -> Self {
        Self {
            normalizer: Arc::new(TextNormalizer::new(&config.pronunciations)),
            voices: Arc::new(VoiceRegistry::from_table(&config.voices)),
            chain: Arc::new(chain),
            config: Arc::new(config),
            cache,
        }
    }

    /// Build the standard chain (cloning → neural → robotic → offline),
    /// probing each backend once.
    pub async fn init_from_config(config: TtsSystemConfig) -> Self {
        let providers = &config.providers;
        let (cloning, neural, offline) = tokio::join!(
            VoiceCloningProvider::connect(&providers.voice_cloning),
            NeuralCloudProvider::detect(&providers.neural_cloud),
            OfflineProvider::detect(&providers.offline),
        );
        let robotic = RoboticCloudProvider::from_config(&providers.robotic_cloud);

        let chain = ProviderChain::new(vec![
            Arc::new(cloning) as Arc<dyn TtsProvider>,
            Arc::new(neural),
            Arc::new(robotic),
            Arc::new(offline),
        ]);
        for provider in chain.providers() {
            tracing::info!(
                "[TTS] Registered provider: {} (available: {})",
                provider.id(),
                provider.is_available()
            );
        }

        let cache = if config.cache.enabled {
            let dir = config.cache.resolved_dir();
            tracing::info!("[TTS] Audio cache at {}", dir.display());
            Some(DiskCache::open(dir, config.cache.max_size_mb).await)
        } else {
            tracing::info!("[TTS] Audio cache disabled");
            None
        };

        Self::new(config, chain, cache)
    }

    pub fn config(&self) -> &TtsSystemConfig {
        &self.config
    }

    /// Check a request and resolve its parameters. Text is not normalized here.
    pub fn validate(&self, request: &SpeechRequest) -> Result<SynthesisRequest, ValidationError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let limits = &self.config.limits;
        let length = request.text.chars().count();
        if length > limits.max_text_length {
            return Err(ValidationError::TextTooLong {
                length,
                max: limits.max_text_length,
            });
        }

        let language = request.language.trim();
        if !self.config.is_supported_language(language) {
            return Err(ValidationError::UnsupportedLanguage(language.to_string()));
        }

        Ok(SynthesisRequest {
            text: text.to_string(),
            language: language.to_string(),
            voice: self
                .voices
                .resolve(request.voice.as_deref(), language, request.gender),
            speed: limits.clamp_speed(request.speed),
            pitch: limits.clamp_pitch(request.pitch),
            speaker_sample: request.speaker_sample.clone(),
        })
    }

    /// Produce audio for `request`, from the cache or the provider chain.
    pub async fn generate(&self, request: SpeechRequest) -> Result<AudioResult, TtsError> {
        let mut synth = self.validate(&request)?;
        synth.text = self.normalizer.normalize(&synth.text, &synth.language);
        if synth.text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if synth.pitch != 0 {
            tracing::debug!("[TTS] Pitch {} accepted but not applied", synth.pitch);
        }

        let key = fingerprint(&synth);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::info!("[TTS] Cache hit {} ({} bytes)", key, hit.data.len());
                return Ok(AudioResult::Buffered(AudioBuffer {
                    data: hit.data,
                    format: hit.format,
                    source: AudioSource::Cache,
                }));
            }
        }

        let mut stream_failure = None;
        if request.stream {
            match self.chain.streaming_provider(&synth) {
                Some(provider) => {
                    let id = provider.id();
                    match stream::open(provider, &synth, &self.config.streaming).await {
                        Ok(audio_stream) => {
                            tracing::info!("[TTS] Streaming from '{}'", id);
                            return Ok(AudioResult::Streamed(audio_stream));
                        }
                        Err(error) => {
                            tracing::warn!(
                                "[TTS] Stream from '{}' failed before first chunk: {} (falling back to buffered)",
                                id,
                                error
                            );
                            stream_failure = Some(ProviderFailure {
                                provider_id: id,
                                error,
                            });
                        }
                    }
                }
                None => tracing::debug!("[TTS] No streaming provider applies, using buffered path"),
            }
        }

        let skip = stream_failure.as_ref().map(|f| f.provider_id.as_str());
        let output = match self.chain.synthesize_skipping(&synth, skip).await {
            Ok(output) => output,
            Err(TtsError::Synthesis { mut attempts }) => {
                if let Some(failure) = stream_failure {
                    attempts.insert(0, failure);
                }
                return Err(TtsError::Synthesis { attempts });
            }
            Err(other) => return Err(other),
        };

        if let Some(cache) = &self.cache {
            cache.put(&key, &output.audio).await;
        }
        tracing::info!(
            "[TTS] Generated {} bytes via '{}'",
            output.audio.data.len(),
            output.provider_id
        );

        Ok(AudioResult::Buffered(AudioBuffer {
            data: output.audio.data,
            format: output.audio.format,
            source: AudioSource::Provider(output.provider_id),
        }))
    }

    // ── Query methods ──────────────────────────────────

    /// List every provider in chain order with its status.
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.chain
            .providers()
            .iter()
            .map(|provider| ProviderStatus {
                id: provider.id(),
                available: provider.is_available(),
                capabilities: provider.capabilities(),
            })
            .collect()
    }

    pub fn engine_info(&self) -> EngineInfo {
        let available: Vec<_> = self
            .chain
            .providers()
            .iter()
            .filter(|p| p.is_available())
            .collect();

        EngineInfo {
            model_name: format!("speech-gateway {}", env!("CARGO_PKG_VERSION")),
            human_like: available
                .iter()
                .any(|p| matches!(p.id().as_str(), "voice_cloning" | "neural_cloud")),
            online: available.iter().any(|p| p.capabilities().requires_network),
            offline_available: available.iter().any(|p| p.id() == "offline"),
            languages: self.config.languages.keys().cloned().collect(),
        }
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.config.languages.values().cloned().collect()
    }

    /// List all configured voices.
    pub fn list_voices(&self) -> Vec<VoiceProfile> {
        self.voices.list()
    }

    /// `None` when caching is disabled.
    pub async fn cache_usage(&self) -> Option<CacheUsage> {
        match &self.cache {
            Some(cache) => Some(cache.usage().await),
            None => None,
        }
    }
}

/// Cache key for a normalized request. A speaker sample is keyed on its own,
/// so cloned output never collides with a stock voice.
fn fingerprint(request: &SynthesisRequest) -> Fingerprint {
    Fingerprint::compute_with_sample(
        &request.text,
        &request.language,
        request.voice.as_deref(),
        request.speaker_sample.as_deref(),
        request.speed,
    )
}
