use super::interface::{
    ProviderFailure, SynthesisRequest, SynthesizedAudio, TtsError, TtsProvider,
};
use std::sync::Arc;

/// Fixed-priority fallback chain of synthesis backends.
///
/// Walk order:
///   1. Skip providers whose `can_handle` is false for the request
///   2. Invoke the first applicable one; success returns immediately
///   3. On failure log it and advance to the next applicable provider
///   4. Nothing left → `TtsError::Synthesis` with every attempt
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn TtsProvider>>,
}

#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub audio: SynthesizedAudio,
    pub provider_id: String,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn TtsProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn TtsProvider>] {
        &self.providers
    }

    /// Ids of the providers that would be tried for `request`, in order.
    pub fn eligible(&self, request: &SynthesisRequest) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| p.can_handle(request))
            .map(|p| p.id())
            .collect()
    }

    /// First applicable provider that can stream.
    pub fn streaming_provider(&self, request: &SynthesisRequest) -> Option<Arc<dyn TtsProvider>> {
        self.providers
            .iter()
            .find(|p| p.capabilities().supports_streaming && p.can_handle(request))
            .cloned()
    }

    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<ChainOutput, TtsError> {
        self.synthesize_skipping(request, None).await
    }

    /// Walk the chain, leaving out `skip` (a provider that already failed
    /// for this request on another path).
    pub async fn synthesize_skipping(
        &self,
        request: &SynthesisRequest,
        skip: Option<&str>,
    ) -> Result<ChainOutput, TtsError> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let id = provider.id();
            if skip == Some(id.as_str()) || !provider.can_handle(request) {
                continue;
            }

            match provider.synthesize(request).await {
                Ok(audio) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            "[TTS] '{}' succeeded after {} failed attempt(s)",
                            id,
                            attempts.len()
                        );
                    }
                    return Ok(ChainOutput {
                        audio,
                        provider_id: id,
                    });
                }
                Err(error) => {
                    tracing::warn!("[TTS] Provider '{}' failed: {}", id, error);
                    attempts.push(ProviderFailure {
                        provider_id: id,
                        error,
                    });
                }
            }
        }

        let err = TtsError::Synthesis { attempts };
        tracing::error!("[TTS] {}", err);
        Err(err)
    }
}
