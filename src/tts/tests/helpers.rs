use crate::tts::cache::DiskCache;
use crate::tts::chain::ProviderChain;
use crate::tts::config::TtsSystemConfig;
use crate::tts::interface::{
    AudioFormat, ChunkStream, ProviderCapabilities, ProviderError, SynthesisRequest,
    SynthesizedAudio, TtsProvider,
};
use crate::tts::manager::TtsService;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Mock provider ───────────────────────────────────────────

/// How a mock answers `synthesize_stream`.
#[derive(Clone)]
pub enum StreamBehavior {
    /// Not streaming-capable.
    Unsupported,
    /// Yield these items, then end.
    Items(Vec<Result<Vec<u8>, ProviderError>>),
    /// Refuse to open.
    FailOnOpen(ProviderError),
    /// Open, then never produce anything.
    Stall,
    /// Produce one chunk, then go silent without ending.
    StallAfter(Vec<u8>),
    /// Produce one small chunk every few milliseconds, forever.
    Endless,
}

/// Scriptable provider with call counters.
pub struct MockProvider {
    id: String,
    outcome: Result<SynthesizedAudio, ProviderError>,
    applicable: bool,
    requires_voice: bool,
    stream: StreamBehavior,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
    stream_dropped: Arc<AtomicBool>,
    last_request: Mutex<Option<SynthesisRequest>>,
}

impl MockProvider {
    fn with_outcome(id: &str, outcome: Result<SynthesizedAudio, ProviderError>) -> Self {
        Self {
            id: id.to_string(),
            outcome,
            applicable: true,
            requires_voice: false,
            stream: StreamBehavior::Unsupported,
            calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            stream_dropped: Arc::new(AtomicBool::new(false)),
            last_request: Mutex::new(None),
        }
    }

    pub fn succeeding(id: &str, data: &[u8]) -> Self {
        Self::with_outcome(id, Ok(SynthesizedAudio::new(data.to_vec(), AudioFormat::Mp3)))
    }

    pub fn failing(id: &str, error: ProviderError) -> Self {
        Self::with_outcome(id, Err(error))
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        if let Ok(audio) = &mut self.outcome {
            audio.format = format;
        }
        self
    }

    pub fn not_applicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    pub fn requiring_voice(mut self) -> Self {
        self.requires_voice = true;
        self
    }

    pub fn streaming(mut self, behavior: StreamBehavior) -> Self {
        self.stream = behavior;
        self
    }

    /// Buffered `synthesize` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Set once a stream handed out by this provider has been dropped.
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn record(&self, request: &SynthesisRequest) {
        *self.last_request.lock().unwrap() = Some(request.clone());
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Wrap `inner` so the flag flips when the stream is released.
fn guarded(inner: ChunkStream, flag: Arc<AtomicBool>) -> ChunkStream {
    let state = (inner, DropFlag(flag));
    Box::pin(futures::stream::unfold(state, |(mut inner, guard)| async move {
        let item = inner.next().await?;
        Some((item, (inner, guard)))
    }))
}

#[async_trait]
impl TtsProvider for MockProvider {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: !matches!(self.stream, StreamBehavior::Unsupported),
            supports_speed: true,
            supports_cloning: false,
            requires_network: self.id != "offline",
        }
    }

    fn is_available(&self) -> bool {
        self.applicable
    }

    fn can_handle(&self, request: &SynthesisRequest) -> bool {
        self.applicable && (!self.requires_voice || request.voice.is_some())
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record(request);
        self.outcome.clone()
    }

    async fn synthesize_stream(&self, request: &SynthesisRequest) -> Result<ChunkStream, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record(request);

        let inner: ChunkStream = match self.stream.clone() {
            StreamBehavior::Unsupported => {
                return Err(ProviderError::Unavailable("streaming not supported".into()))
            }
            StreamBehavior::FailOnOpen(error) => return Err(error),
            StreamBehavior::Items(items) => Box::pin(futures::stream::iter(items)),
            StreamBehavior::Stall => Box::pin(futures::stream::pending::<Result<Vec<u8>, ProviderError>>()),
            StreamBehavior::StallAfter(first) => Box::pin(
                futures::stream::once(async move { Ok::<_, ProviderError>(first) })
                    .chain(futures::stream::pending()),
            ),
            StreamBehavior::Endless => Box::pin(futures::stream::unfold(0u8, |n| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some((Ok::<_, ProviderError>(vec![n]), n.wrapping_add(1)))
            })),
        };
        Ok(guarded(inner, self.stream_dropped.clone()))
    }
}

// ── Service setup ───────────────────────────────────────────

pub fn chain_of(providers: &[Arc<MockProvider>]) -> ProviderChain {
    ProviderChain::new(
        providers
            .iter()
            .map(|p| p.clone() as Arc<dyn TtsProvider>)
            .collect(),
    )
}

/// Service over mock providers with a cache in a fresh temp dir.
pub async fn cached_service(providers: &[Arc<MockProvider>]) -> (TtsService, TempDir) {
    cached_service_with(TtsSystemConfig::default(), providers).await
}

pub async fn cached_service_with(
    config: TtsSystemConfig,
    providers: &[Arc<MockProvider>],
) -> (TtsService, TempDir) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let cache = DiskCache::open(tmp.path().join("cache"), config.cache.max_size_mb).await;
    let service = TtsService::new(config, chain_of(providers), Some(cache));
    (service, tmp)
}

/// Number of files in the cache directory of a `cached_service` temp dir.
pub fn cache_file_count(tmp: &TempDir) -> usize {
    std::fs::read_dir(tmp.path().join("cache"))
        .map(|dir| dir.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}
