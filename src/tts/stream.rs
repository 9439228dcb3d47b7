//! Streaming adapter: turns one provider's incremental output into an
//! [`AudioStream`] the caller can consume at its own pace.
//!
//! The provider stream is pumped by an independent task into a bounded
//! channel. Dropping the [`AudioStream`] closes the channel; the task sees
//! that, stops, and drops the provider stream (which kills any backend
//! subprocess). A backend that goes quiet for longer than the idle timeout
//! gets the same treatment, with a final `Timeout` error for the consumer.

use super::config::StreamingConfig;
use super::interface::{AudioFormat, ChunkStream, ProviderError, SynthesisRequest, TtsProvider};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type ChunkResult = Result<Vec<u8>, ProviderError>;

/// Ordered, finite, single-use sequence of audio chunks.
///
/// An `Err` item means the backend failed mid-stream; nothing follows it.
pub struct AudioStream {
    format: AudioFormat,
    provider_id: String,
    inner: ReceiverStream<ChunkResult>,
}

impl AudioStream {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Drain the stream into one buffer. Stops at the first error.
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>, ProviderError> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("format", &self.format)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

impl Stream for AudioStream {
    type Item = ChunkResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Start streaming `request` from `provider`.
///
/// Resolves once the first non-empty chunk has arrived. Any failure up to
/// that point (error, end of output, or no chunk within the configured
/// first-chunk timeout) is returned as `Err` so the caller can fall back to
/// buffered synthesis.
pub async fn open(
    provider: Arc<dyn TtsProvider>,
    request: &SynthesisRequest,
    config: &StreamingConfig,
) -> Result<AudioStream, ProviderError> {
    let provider_id = provider.id();
    let format = provider.stream_format();
    let deadline = config.first_chunk_timeout();

    let (first, upstream) = tokio::time::timeout(deadline, start(provider.as_ref(), request))
        .await
        .map_err(|_| ProviderError::Timeout(deadline))??;

    tracing::debug!(
        "[TTS/Stream] '{}' produced first chunk ({} bytes)",
        provider_id,
        first.len()
    );

    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    tokio::spawn(pump(
        provider_id.clone(),
        first,
        upstream,
        tx,
        config.chunk_idle_timeout(),
    ));

    Ok(AudioStream {
        format,
        provider_id,
        inner: ReceiverStream::new(rx),
    })
}

async fn start(
    provider: &dyn TtsProvider,
    request: &SynthesisRequest,
) -> Result<(Vec<u8>, ChunkStream), ProviderError> {
    let mut upstream = provider.synthesize_stream(request).await?;
    loop {
        match upstream.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => return Ok((chunk, upstream)),
            Some(Err(e)) => return Err(e),
            None => return Err(ProviderError::EmptyOutput),
        }
    }
}

async fn pump(
    provider_id: String,
    first: Vec<u8>,
    mut upstream: ChunkStream,
    tx: mpsc::Sender<ChunkResult>,
    idle: Duration,
) {
    if tx.send(Ok(first)).await.is_err() {
        tracing::debug!("[TTS/Stream] '{}' consumer gone before first chunk", provider_id);
        return;
    }

    let mut delivered = 1usize;
    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::info!(
                    "[TTS/Stream] '{}' consumer disconnected after {} chunk(s), cancelling",
                    provider_id,
                    delivered
                );
                break;
            }
            item = tokio::time::timeout(idle, upstream.next()) => match item {
                Err(_) => {
                    tracing::warn!(
                        "[TTS/Stream] '{}' stalled after {} chunk(s), no data for {:?}",
                        provider_id,
                        delivered,
                        idle
                    );
                    let _ = tx.send(Err(ProviderError::Timeout(idle))).await;
                    break;
                }
                Ok(Some(Ok(chunk))) if chunk.is_empty() => {}
                Ok(Some(Ok(chunk))) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                    delivered += 1;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(
                        "[TTS/Stream] '{}' failed after {} chunk(s): {}",
                        provider_id,
                        delivered,
                        e
                    );
                    let _ = tx.send(Err(e)).await;
                    break;
                }
                Ok(None) => {
                    tracing::debug!("[TTS/Stream] '{}' finished ({} chunk(s))", provider_id, delivered);
                    break;
                }
            },
        }
    }
    // Stop the backend before the channel closes.
    drop(upstream);
}
