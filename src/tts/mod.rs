pub mod cache;
pub mod chain;
pub mod config;
pub mod detect;
pub mod interface;
pub mod manager;
pub mod neural_cloud;
pub mod normalizer;
pub mod offline;
pub mod robotic_cloud;
pub mod stream;
pub mod voice_cloning;
pub mod voice_registry;

#[cfg(test)]
mod tests;

pub use cache::{CacheUsage, DiskCache, Fingerprint};
pub use chain::{ChainOutput, ProviderChain};
pub use config::{load_config, save_config, TtsSystemConfig};
pub use interface::{
    AudioFormat, Gender, ProviderCapabilities, ProviderError, SynthesisRequest, SynthesizedAudio,
    TtsError, TtsProvider, ValidationError, VoiceProfile,
};
pub use manager::{
    AudioBuffer, AudioResult, AudioSource, EngineInfo, ProviderStatus, SpeechRequest, TtsService,
};
pub use normalizer::{normalize, TextNormalizer};
pub use stream::AudioStream;
