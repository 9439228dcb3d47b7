pub mod config;
pub mod tts;
pub mod utils;

pub use tts::{
    AudioFormat, AudioResult, Gender, SpeechRequest, TtsError, TtsService, TtsSystemConfig,
    ValidationError,
};
