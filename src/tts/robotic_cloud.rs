use super::config::RoboticCloudConfig;
use super::interface::{
    AudioFormat, ProviderCapabilities, ProviderError, SynthesisRequest, SynthesizedAudio,
    TtsProvider,
};
use crate::utils::http::{request_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Speeds below this are rendered with the backend's "slow" mode.
const SLOW_SPEED_THRESHOLD: f32 = 0.8;

/// Robotic cloud voice via the Google Translate TTS endpoint.
///
/// Lowest quality of the network voices but needs nothing beyond a language
/// code, so it is the universal fallback before offline synthesis. Long text
/// is sent in pieces and the MP3 responses are concatenated.
pub struct RoboticCloudProvider {
    client: Client,
    base_url: String,
    max_chunk_chars: usize,
    retry: RetryPolicy,
    enabled: bool,
}

impl RoboticCloudProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chunk_chars: 100,
            retry: RetryPolicy::default(),
            enabled: true,
        }
    }

    /// Construct from config.
    pub fn from_config(config: &RoboticCloudConfig) -> Self {
        let mut provider = Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        );
        provider.max_chunk_chars = config.max_chunk_chars.max(1);
        provider.retry = config.retry.clone();
        provider.enabled = config.enabled;
        provider
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_chunk_chars(mut self, max: usize) -> Self {
        self.max_chunk_chars = max.max(1);
        self
    }

    async fn fetch_piece(
        &self,
        piece: &str,
        lang: &str,
        slow: bool,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/translate_tts", self.base_url);
        let query = [
            ("ie", "UTF-8".to_string()),
            ("q", piece.to_string()),
            ("tl", lang.to_string()),
            ("client", "tw-ob".to_string()),
            ("ttsspeed", if slow { "0.24" } else { "1" }.to_string()),
            ("total", total.to_string()),
            ("idx", idx.to_string()),
            ("textlen", piece.chars().count().to_string()),
        ];

        let response = request_with_retry(
            || self.client.get(&url).query(&query).send(),
            &self.retry,
        )
        .await
        .map_err(ProviderError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::SynthesisFailed(format!(
                "translate_tts returned {}: {}",
                status,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(format!("translate_tts bytes error: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Map a request language to a backend code; unknown codes read as English.
pub fn map_language(language: &str) -> &'static str {
    const KNOWN: [&str; 13] = [
        "bn", "hi", "mr", "gu", "kn", "ml", "pa", "ur", "or", "as", "ta", "te", "en",
    ];
    KNOWN
        .iter()
        .find(|code| **code == language)
        .copied()
        .unwrap_or("en")
}

/// Split text into pieces of at most `max_chars` characters, on whitespace
/// where possible. Overlong words are cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

        if needed <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len <= max_chars {
            current.push_str(word);
            current_len = word_len;
        } else {
            let chars: Vec<char> = word.chars().collect();
            for slice in chars.chunks(max_chars) {
                pieces.push(slice.iter().collect());
            }
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[async_trait]
impl TtsProvider for RoboticCloudProvider {
    fn id(&self) -> String {
        "robotic_cloud".to_string()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: false,
            supports_speed: true,
            supports_cloning: false,
            requires_network: true,
        }
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn can_handle(&self, _request: &SynthesisRequest) -> bool {
        self.enabled
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let lang = map_language(&request.language);
        let slow = request.speed < SLOW_SPEED_THRESHOLD;
        let pieces = split_text(&request.text, self.max_chunk_chars);
        tracing::info!(
            "[TTS/Robotic] Generating standard speech for {} ({} piece(s), slow={})",
            lang,
            pieces.len(),
            slow
        );

        let mut audio = Vec::new();
        for (idx, piece) in pieces.iter().enumerate() {
            let bytes = self.fetch_piece(piece, lang, slow, idx, pieces.len()).await?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(ProviderError::EmptyOutput);
        }
        Ok(SynthesizedAudio::new(audio, AudioFormat::Mp3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> RoboticCloudProvider {
        RoboticCloudProvider::new(server.uri(), Duration::from_secs(5)).with_retry(RetryPolicy {
            max_retries: 0,
            initial_delay_ms: 10,
        })
    }

    #[test]
    fn test_language_mapping() {
        assert_eq!(map_language("bn"), "bn");
        assert_eq!(map_language("te"), "te");
        assert_eq!(map_language("xx"), "en");
    }

    #[test]
    fn test_split_text_respects_limit() {
        let pieces = split_text("one two three four", 9);
        assert_eq!(pieces, vec!["one two", "three", "four"]);
        assert!(split_text("   ", 10).is_empty());
        assert_eq!(split_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(split_text("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
    }

    #[test]
    fn test_split_text_counts_characters_not_bytes() {
        let pieces = split_text("আমি বাংলায়", 4);
        assert_eq!(pieces, vec!["আমি", "বাংল", "ায়"]);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_pieces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("idx", "0"))
            .and(query_param("tl", "hi"))
            .and(query_param("client", "tw-ob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"AAA".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("idx", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"BBB".to_vec()))
            .mount(&server)
            .await;

        let provider = provider(&server).with_max_chunk_chars(5);
        let request = SynthesisRequest::new("hello world", "hi");
        let audio = provider.synthesize(&request).await.unwrap();
        assert_eq!(audio.data, b"AAABBB");
        assert_eq!(audio.format, AudioFormat::Mp3);
    }

    #[tokio::test]
    async fn test_slow_flag_below_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("ttsspeed", "0.24"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"slow".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let request = SynthesisRequest::new("hello", "en").with_speed(0.6);
        let audio = provider(&server).synthesize(&request).await.unwrap();
        assert_eq!(audio.data, b"slow");
    }

    #[tokio::test]
    async fn test_http_error_is_provider_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .synthesize(&SynthesisRequest::new("hello", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SynthesisFailed(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn test_empty_body_is_provider_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = provider(&server)
            .synthesize(&SynthesisRequest::new("hello", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyOutput));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_failure() {
        let provider = RoboticCloudProvider::new("http://127.0.0.1:9".into(), Duration::from_secs(2))
            .with_retry(RetryPolicy {
                max_retries: 0,
                initial_delay_ms: 10,
            });
        let err = provider
            .synthesize(&SynthesisRequest::new("hello", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
