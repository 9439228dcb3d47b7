use super::config::NeuralCloudConfig;
use super::detect::{self, DetectionStrategy, Launcher};
use super::interface::{
    AudioFormat, ChunkStream, ProviderCapabilities, ProviderError, SynthesisRequest,
    SynthesizedAudio, TtsProvider,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};

const READ_CHUNK_BYTES: usize = 4096;

/// Neural cloud voices through the `edge-tts` command-line tool.
///
/// Audio (MP3) is read from the tool's stdout, either all at once or
/// incrementally for streaming. Needs a resolved voice id and a launcher
/// found at startup.
pub struct NeuralCloudProvider {
    launcher: Option<Launcher>,
    timeout: Duration,
}

impl NeuralCloudProvider {
    pub fn new(launcher: Option<Launcher>, timeout: Duration) -> Self {
        Self { launcher, timeout }
    }

    /// Resolve the launcher once: explicit config command, else detection.
    pub async fn detect(config: &NeuralCloudConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        if !config.enabled {
            tracing::info!("[TTS] Neural cloud provider disabled by config");
            return Self::new(None, timeout);
        }
        let launcher = match &config.command {
            Some(parts) => Launcher::from_parts(parts),
            None => {
                detect::detect(
                    "Edge TTS (neural)",
                    &Self::detection_strategies(),
                    Duration::from_secs(config.probe_timeout_secs),
                )
                .await
            }
        };
        if launcher.is_none() {
            tracing::warn!("[TTS] edge-tts not found. Human-like voices will not work.");
        }
        Self::new(launcher, timeout)
    }

    pub fn detection_strategies() -> Vec<DetectionStrategy> {
        vec![
            DetectionStrategy::executable("edge-tts", &["--help"]),
            DetectionStrategy::python_module("python3", "edge_tts", &["--help"]),
            DetectionStrategy::python_module("python", "edge_tts", &["--help"]),
        ]
    }

    fn build_command(
        &self,
        request: &SynthesisRequest,
    ) -> Result<tokio::process::Command, ProviderError> {
        let launcher = self
            .launcher
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("edge-tts not installed".into()))?;
        let voice = request
            .voice
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("no neural voice resolved".into()))?;

        let mut cmd = launcher.command();
        // `--flag=value` so text or rates starting with '-' are not read as options.
        cmd.arg(format!("--text={}", request.text))
            .arg(format!("--voice={}", voice))
            .arg(format!("--rate={}", rate_string(request.speed)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped());
        Ok(cmd)
    }
}

/// edge-tts rate: signed percentage from neutral, truncated toward zero,
/// `1.5` → `+50%`.
pub fn rate_string(speed: f32) -> String {
    let pct = ((f64::from(speed) - 1.0) * 100.0).trunc() as i32;
    format!("{:+}%", pct)
}

#[async_trait]
impl TtsProvider for NeuralCloudProvider {
    fn id(&self) -> String {
        "neural_cloud".to_string()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_speed: true,
            supports_cloning: false,
            requires_network: true,
        }
    }

    fn is_available(&self) -> bool {
        self.launcher.is_some()
    }

    fn can_handle(&self, request: &SynthesisRequest) -> bool {
        self.launcher.is_some() && request.voice.is_some()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        let mut cmd = self.build_command(request)?;
        cmd.stderr(Stdio::piped());

        tracing::info!(
            "[TTS/Neural] Generating speech for {} with voice {:?}",
            request.language,
            request.voice
        );
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .map_err(|e| ProviderError::Process(format!("failed to run edge-tts: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Process(format!(
                "edge-tts exited with {}: {}",
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }
        if output.stdout.is_empty() {
            return Err(ProviderError::EmptyOutput);
        }
        Ok(SynthesizedAudio::new(output.stdout, AudioFormat::Mp3))
    }

    fn stream_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    async fn synthesize_stream(&self, request: &SynthesisRequest) -> Result<ChunkStream, ProviderError> {
        let mut cmd = self.build_command(request)?;
        cmd.stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProviderError::Process(format!("failed to spawn edge-tts: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Process("edge-tts stdout unavailable".into()))?;

        Ok(Box::pin(child_output_stream(child, stdout)))
    }
}

struct ChildReader {
    child: Child,
    stdout: ChildStdout,
}

/// Read a child's stdout as a chunk stream. A non-zero exit after EOF is an
/// error item. Dropping the stream kills the child.
fn child_output_stream(
    child: Child,
    stdout: ChildStdout,
) -> impl futures::Stream<Item = Result<Vec<u8>, ProviderError>> + Send {
    futures::stream::unfold(Some(ChildReader { child, stdout }), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        match reader.stdout.read(&mut buf).await {
            Ok(0) => match reader.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some((
                    Err(ProviderError::Process(format!("edge-tts exited with {}", status))),
                    None,
                )),
                Err(e) => Some((Err(ProviderError::Process(e.to_string())), None)),
            },
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((
                Err(ProviderError::Process(format!("edge-tts read error: {}", e))),
                None,
            )),
        }
    })
}
