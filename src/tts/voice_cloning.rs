use super::config::VoiceCloningConfig;
use super::interface::{
    AudioFormat, ProviderCapabilities, ProviderError, SynthesisRequest, SynthesizedAudio,
    TtsProvider,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

/// Voice cloning through a local XTTS-style inference server.
///
/// The server must expose:
///   POST /tts_to_audio — multipart (text, language, speed, speaker_wav file), returns WAV
///
/// Only applies when the request carries a reference speaker sample.
pub struct VoiceCloningProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    available: bool,
}

impl VoiceCloningProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            available: true,
        }
    }

    /// Build from config and probe the server once. Any HTTP response counts
    /// as reachable (a running server may answer `/` with 404).
    pub async fn connect(config: &VoiceCloningConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let Some(base_url) = config.base_url.clone().filter(|u| !u.trim().is_empty()) else {
            tracing::info!("[TTS] Voice cloning server not configured");
            return Self::unavailable(timeout);
        };
        if !config.enabled {
            tracing::info!("[TTS] Voice cloning provider disabled by config");
            return Self::unavailable(timeout);
        }

        let mut provider = Self::new(base_url, timeout);
        provider.api_key = config.resolve_api_key();
        provider.available = provider
            .client
            .get(&provider.base_url)
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .send()
            .await
            .is_ok();

        if provider.available {
            tracing::info!("[TTS] Voice cloning server reachable at {}", provider.base_url);
        } else {
            tracing::warn!("[TTS] Voice cloning server unreachable at {}", provider.base_url);
        }
        provider
    }

    fn unavailable(timeout: Duration) -> Self {
        let mut provider = Self::new(String::new(), timeout);
        provider.available = false;
        provider
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl TtsProvider for VoiceCloningProvider {
    fn id(&self) -> String {
        "voice_cloning".to_string()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: false,
            supports_speed: true,
            supports_cloning: true,
            requires_network: false,
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn can_handle(&self, request: &SynthesisRequest) -> bool {
        self.available && request.speaker_sample.is_some()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let sample_path = request
            .speaker_sample
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("no reference speaker sample".into()))?;

        let sample = tokio::fs::read(sample_path).await.map_err(|e| {
            ProviderError::SynthesisFailed(format!(
                "cannot read speaker sample {}: {}",
                sample_path.display(),
                e
            ))
        })?;
        let file_name = sample_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speaker.wav".to_string());

        let part = Part::bytes(sample)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::SynthesisFailed(e.to_string()))?;
        let form = Form::new()
            .text("text", request.text.clone())
            .text("language", request.language.clone())
            .text("speed", request.speed.to_string())
            .part("speaker_wav", part);

        tracing::info!("[TTS/Cloning] Generating cloned speech for {}", request.language);
        let url = format!("{}/tts_to_audio", self.base_url);
        let mut builder = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("voice cloning request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::SynthesisFailed(format!(
                "voice cloning server returned {}: {}",
                status,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(format!("voice cloning bytes error: {}", e)))?;
        if bytes.is_empty() {
            return Err(ProviderError::EmptyOutput);
        }
        Ok(SynthesizedAudio::new(bytes.to_vec(), AudioFormat::Wav))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"RIFF-speaker").unwrap();
        file
    }

    #[tokio::test]
    async fn test_only_applies_with_sample() {
        let provider = VoiceCloningProvider::new("http://127.0.0.1:1".into(), Duration::from_secs(1));
        let request = SynthesisRequest::new("hello", "en");
        assert!(!provider.can_handle(&request));
        assert!(provider.can_handle(&request.with_speaker_sample("/tmp/me.wav")));
    }

    #[tokio::test]
    async fn test_unconfigured_server_is_unavailable() {
        let provider = VoiceCloningProvider::connect(&VoiceCloningConfig::default()).await;
        assert!(!provider.is_available());
        let request = SynthesisRequest::new("hello", "en").with_speaker_sample("/tmp/me.wav");
        assert!(!provider.can_handle(&request));
    }

    #[tokio::test]
    async fn test_connect_probes_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let config = VoiceCloningConfig {
            base_url: Some(server.uri()),
            ..Default::default()
        };
        let provider = VoiceCloningProvider::connect(&config).await;
        assert!(provider.is_available());
    }

    #[tokio::test]
    async fn test_synthesize_uploads_sample() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tts_to_audio"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF-cloned".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let sample = sample_file();
        let provider = VoiceCloningProvider::new(server.uri(), Duration::from_secs(5))
            .with_api_key(Some("secret".into()));
        let request = SynthesisRequest::new("hello", "bn").with_speaker_sample(sample.path());
        let audio = provider.synthesize(&request).await.unwrap();
        assert_eq!(audio.data, b"RIFF-cloned");
        assert_eq!(audio.format, AudioFormat::Wav);

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("RIFF-speaker"));
        assert!(body.contains("name=\"language\""));
    }

    #[tokio::test]
    async fn test_missing_sample_file_fails() {
        let provider = VoiceCloningProvider::new("http://127.0.0.1:1".into(), Duration::from_secs(1));
        let request = SynthesisRequest::new("hello", "en").with_speaker_sample("/definitely/not/here.wav");
        let err = provider.synthesize(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::SynthesisFailed(_)));
    }

    #[tokio::test]
    async fn test_server_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tts_to_audio"))
            .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
            .mount(&server)
            .await;

        let sample = sample_file();
        let provider = VoiceCloningProvider::new(server.uri(), Duration::from_secs(5));
        let request = SynthesisRequest::new("hello", "en").with_speaker_sample(sample.path());
        let err = provider.synthesize(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::SynthesisFailed(ref m) if m.contains("CUDA")));
    }
}
