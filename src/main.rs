use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use speech_gateway::tts::{self, AudioResult, Gender, SpeechRequest, TtsService};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speech-gateway")]
#[command(about = "Synthesize speech through a fallback chain of TTS backends", long_about = None)]
struct Cli {
    /// Text to speak
    #[arg(short, long, required_unless_present_any = ["info", "languages"])]
    text: Option<String>,

    /// Language code (bn, hi, en, ...)
    #[arg(short, long, default_value = "bn")]
    language: String,

    /// Voice gender used to pick a neural voice
    #[arg(short, long, default_value = "female")]
    gender: Gender,

    /// Explicit neural voice id (overrides --gender)
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate, 0.5 to 2.0
    #[arg(short, long)]
    speed: Option<f32>,

    /// Pitch offset, -20 to 20
    #[arg(long, allow_hyphen_values = true)]
    pitch: Option<i32>,

    /// Reference speaker WAV for voice cloning
    #[arg(long)]
    speaker_wav: Option<PathBuf>,

    /// Write audio as it is produced instead of waiting for the whole file
    #[arg(long)]
    stream: bool,

    /// Output file (defaults to tts_<lang>_<timestamp>.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (defaults to the per-user data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show engine and provider status, then exit
    #[arg(long)]
    info: bool,

    /// List supported languages, then exit
    #[arg(long)]
    languages: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(speech_gateway::config::default_config_path);
    let config = tts::load_config(&config_path);

    if cli.languages {
        for lang in config.languages.values() {
            println!("{:<4} {}", lang.code, lang.name);
        }
        return Ok(());
    }

    let service = TtsService::init_from_config(config).await;

    if cli.info {
        print_info(&service).await?;
        return Ok(());
    }

    let text = cli.text.clone().context("--text is required")?;
    let mut request = SpeechRequest::new(text, cli.language.clone()).with_gender(cli.gender);
    request.speed = cli.speed;
    request.pitch = cli.pitch;
    request.voice = cli.voice.clone();
    request.speaker_sample = cli.speaker_wav.clone();
    request.stream = cli.stream;

    let result = service.generate(request).await?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_name(&cli.language, result.format().extension()));

    let written = write_result(result, &output).await?;
    println!("Saved {} bytes to {}", written, output.display());
    Ok(())
}

async fn print_info(service: &TtsService) -> Result<()> {
    let info = service.engine_info();
    println!("{}", serde_json::to_string_pretty(&info)?);
    println!("{}", serde_json::to_string_pretty(&service.providers())?);
    if let Some(usage) = service.cache_usage().await {
        println!("{}", serde_json::to_string_pretty(&usage)?);
    }
    Ok(())
}

fn default_output_name(language: &str, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("tts_{}_{}.{}", language, stamp, extension))
}

async fn write_result(result: AudioResult, path: &Path) -> Result<usize> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))?;

    let written = match result {
        AudioResult::Buffered(buffer) => {
            file.write_all(&buffer.data).await?;
            buffer.data.len()
        }
        AudioResult::Streamed(mut stream) => {
            let mut total = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("stream interrupted")?;
                file.write_all(&chunk).await?;
                total += chunk.len();
            }
            total
        }
    };
    file.flush().await?;
    Ok(written)
}
