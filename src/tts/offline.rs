use super::config::OfflineConfig;
use super::detect::{self, DetectionStrategy, Launcher};
use super::interface::{
    AudioFormat, ProviderCapabilities, ProviderError, SynthesisRequest, SynthesizedAudio,
    TtsProvider,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const MIN_WPM: u32 = 80;
const MAX_WPM: u32 = 450;

/// Local synthesis through `espeak-ng` (WAV on stdout). No network needed;
/// the last link of the chain.
pub struct OfflineProvider {
    launcher: Option<Launcher>,
    timeout: Duration,
    words_per_minute: u32,
}

impl OfflineProvider {
    pub fn new(launcher: Option<Launcher>, timeout: Duration) -> Self {
        Self {
            launcher,
            timeout,
            words_per_minute: 175,
        }
    }

    pub async fn detect(config: &OfflineConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let launcher = if !config.enabled {
            tracing::info!("[TTS] Offline provider disabled by config");
            None
        } else {
            match &config.command {
                Some(parts) => Launcher::from_parts(parts),
                None => {
                    detect::detect(
                        "Offline TTS engine",
                        &Self::detection_strategies(),
                        Duration::from_secs(config.probe_timeout_secs),
                    )
                    .await
                }
            }
        };
        let mut provider = Self::new(launcher, timeout);
        provider.words_per_minute = config.words_per_minute;
        provider
    }

    pub fn detection_strategies() -> Vec<DetectionStrategy> {
        vec![
            DetectionStrategy::executable("espeak-ng", &["--version"]),
            DetectionStrategy::executable("espeak", &["--version"]),
        ]
    }

    pub fn with_words_per_minute(mut self, wpm: u32) -> Self {
        self.words_per_minute = wpm;
        self
    }

    /// espeak rate for a speed factor.
    pub fn words_per_minute_for(&self, speed: f32) -> u32 {
        let wpm = (self.words_per_minute as f32 * speed).round();
        (wpm.max(0.0) as u32).clamp(MIN_WPM, MAX_WPM)
    }

    async fn run(&self, launcher: &Launcher, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        let mut cmd = launcher.command();
        cmd.arg("-v")
            .arg(&request.language)
            .arg("-s")
            .arg(self.words_per_minute_for(request.speed).to_string())
            .arg("--stdout")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProviderError::Process(format!("failed to spawn offline engine: {}", e)))?;

        // Text goes through stdin so nothing in it can be parsed as a flag.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.text.as_bytes())
                .await
                .map_err(|e| ProviderError::Process(format!("failed to write text: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Process(format!(
                "offline engine exited with {}: {}",
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl TtsProvider for OfflineProvider {
    fn id(&self) -> String {
        "offline".to_string()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: false,
            supports_speed: true,
            supports_cloning: false,
            requires_network: false,
        }
    }

    fn is_available(&self) -> bool {
        self.launcher.is_some()
    }

    fn can_handle(&self, _request: &SynthesisRequest) -> bool {
        self.launcher.is_some()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let launcher = self
            .launcher
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("offline engine not initialized".into()))?;

        tracing::info!("[TTS/Offline] Generating local speech for {}", request.language);
        let data = tokio::time::timeout(self.timeout, self.run(launcher, request))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        if data.is_empty() {
            return Err(ProviderError::EmptyOutput);
        }
        Ok(SynthesizedAudio::new(data, AudioFormat::Wav))
    }
}
