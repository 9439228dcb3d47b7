use super::interface::{AudioFormat, SynthesizedAudio};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File-backed, content-addressed TTS audio cache.
///
/// One flat directory, one file per entry named `<fingerprint>.<ext>`.
/// Entries are immutable once written; there is no expiry or eviction, only
/// an advisory size ceiling reported through [`DiskCache::usage`].
///
/// The cache is best-effort: read failures are misses and write failures are
/// logged and dropped.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    max_size_bytes: u64,
}

/// SHA-256 (hex) of the length-prefixed request fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

#[derive(Debug, Error)]
enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheUsage {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_size_bytes: u64,
    pub over_capacity: bool,
}

impl Fingerprint {
    /// Compute the key for a normalized request.
    pub fn compute(text: &str, language: &str, voice: Option<&str>, speed: f32) -> Self {
        Self::compute_with_sample(text, language, voice, None, speed)
    }

    /// Same as [`Fingerprint::compute`], with the reference speaker sample as
    /// its own field.
    pub fn compute_with_sample(
        text: &str,
        language: &str,
        voice: Option<&str>,
        speaker_sample: Option<&Path>,
        speed: f32,
    ) -> Self {
        let speed = format!("{:?}", speed);
        let sample = speaker_sample.map(|p| p.to_string_lossy());
        let mut hasher = Sha256::new();
        for field in [
            Some(text),
            Some(language),
            voice,
            sample.as_deref(),
            Some(speed.as_str()),
        ] {
            hasher.update(encode_field(field));
        }
        let hash = hasher.finalize();
        Self(hash.iter().map(|b| format!("{:02x}", b)).collect::<String>())
    }

    /// Accept only well-formed digests so a key can never escape the cache dir.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `<byte len>:<value>` for present fields, `-` for absent ones. No encoding
/// is a prefix of another, so distinct field lists hash distinct inputs.
fn encode_field(field: Option<&str>) -> Vec<u8> {
    match field {
        Some(value) => format!("{}:{}", value.len(), value).into_bytes(),
        None => b"-".to_vec(),
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl DiskCache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>, max_size_mb: u64) -> Self {
        let dir = dir.into();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(
                "[TTS/Cache] Could not create cache dir {}: {} (cache will miss)",
                dir.display(),
                e
            );
        }
        Self {
            dir,
            max_size_bytes: max_size_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn compute_fingerprint(
        text: &str,
        language: &str,
        voice: Option<&str>,
        speed: f32,
    ) -> Fingerprint {
        Fingerprint::compute(text, language, voice, speed)
    }

    fn entry_path(&self, key: &Fingerprint, format: AudioFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.as_str(), format.extension()))
    }

    /// Look up an entry. Any storage error is reported as a miss.
    pub async fn get(&self, key: &Fingerprint) -> Option<SynthesizedAudio> {
        match self.try_get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("[TTS/Cache] Read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn try_get(&self, key: &Fingerprint) -> Result<Option<SynthesizedAudio>, CacheError> {
        for format in AudioFormat::ALL {
            match tokio::fs::read(self.entry_path(key, format)).await {
                Ok(data) if !data.is_empty() => {
                    return Ok(Some(SynthesizedAudio::new(data, format)));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Store an entry. Failures are logged and swallowed.
    pub async fn put(&self, key: &Fingerprint, audio: &SynthesizedAudio) {
        if audio.data.is_empty() {
            return;
        }
        match self.try_put(key, audio).await {
            Ok(()) => tracing::debug!(
                "[TTS/Cache] Stored {} ({} bytes, {})",
                key,
                audio.data.len(),
                audio.format.extension()
            ),
            Err(e) => tracing::warn!("[TTS/Cache] Write failed for {}: {}", key, e),
        }
    }

    async fn try_put(&self, key: &Fingerprint, audio: &SynthesizedAudio) -> Result<(), CacheError> {
        let final_path = self.entry_path(key, audio.format);
        // Unique temp name + rename keeps readers from seeing partial files
        // and lets concurrent writers of the same key race harmlessly.
        let tmp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            key.as_str(),
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(e) = tokio::fs::write(&tmp_path, &audio.data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        // A key maps to one file; drop a stale entry in the other container.
        for other in AudioFormat::ALL.into_iter().filter(|f| *f != audio.format) {
            let _ = tokio::fs::remove_file(self.entry_path(key, other)).await;
        }
        Ok(())
    }

    /// Current on-disk footprint against the advisory ceiling.
    pub async fn usage(&self) -> CacheUsage {
        let (entries, total_bytes) = match self.scan().await {
            Ok(totals) => totals,
            Err(e) => {
                tracing::warn!("[TTS/Cache] Usage scan failed: {}", e);
                (0, 0)
            }
        };
        CacheUsage {
            entries,
            total_bytes,
            max_size_bytes: self.max_size_bytes,
            over_capacity: total_bytes > self.max_size_bytes,
        }
    }

    async fn scan(&self) -> Result<(usize, u64), CacheError> {
        let mut entries = 0;
        let mut total = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_entry = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(Fingerprint::parse)
                .is_some()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(AudioFormat::from_extension)
                    .is_some();
            if !is_entry {
                continue;
            }
            entries += 1;
            total += entry.metadata().await?.len();
        }
        Ok((entries, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn open_temp(max_mb: u64) -> (DiskCache, TempDir) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let cache = DiskCache::open(tmp.path().join("cache"), max_mb).await;
        (cache, tmp)
    }

    #[test]
    fn test_fingerprint_matches_sha256_layout() {
        let fp = Fingerprint::compute("Hello", "en", Some("en-US-AriaNeural"), 1.0);
        let mut hasher = Sha256::new();
        hasher.update(b"5:Hello2:en16:en-US-AriaNeural-3:1.0");
        let expected: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(fp.as_str(), expected);
        assert_eq!(fp.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_every_field() {
        let base = Fingerprint::compute("Hello", "en", None, 1.0);
        let variants = [
            Fingerprint::compute("Hello!", "en", None, 1.0),
            Fingerprint::compute("Hello", "hi", None, 1.0),
            Fingerprint::compute("Hello", "en", Some("en-US-AriaNeural"), 1.0),
            Fingerprint::compute("Hello", "en", None, 1.5),
        ];
        let mut seen = HashSet::new();
        seen.insert(base.clone());
        for v in variants {
            assert!(seen.insert(v), "fingerprint collision");
        }
        assert_eq!(base, Fingerprint::compute("Hello", "en", None, 1.0));
    }

    #[test]
    fn test_delimiters_inside_fields_do_not_collide() {
        let a = Fingerprint::compute("a|en|v", "en", None, 1.0);
        let b = Fingerprint::compute("a", "en", Some("v|en|"), 1.0);
        assert_ne!(a, b);

        let no_voice = Fingerprint::compute("Hello", "en", None, 1.0);
        let empty_voice = Fingerprint::compute("Hello", "en", Some(""), 1.0);
        assert_ne!(no_voice, empty_voice);

        let folded = Fingerprint::compute("Hello", "en", Some("v@/tmp/a.wav"), 1.0);
        let sampled = Fingerprint::compute_with_sample(
            "Hello",
            "en",
            Some("v"),
            Some(Path::new("/tmp/a.wav")),
            1.0,
        );
        assert_ne!(folded, sampled);
        let empty_sample =
            Fingerprint::compute_with_sample("Hello", "en", None, Some(Path::new("")), 1.0);
        assert_ne!(no_voice, empty_sample);
    }

    #[test]
    fn test_parse_rejects_path_like_keys() {
        assert!(Fingerprint::parse("../etc/passwd").is_none());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_none());
        let fp = Fingerprint::compute("x", "en", None, 1.0);
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp));
    }

    #[tokio::test]
    async fn test_put_then_get_is_byte_identical() {
        let (cache, _tmp) = open_temp(500).await;
        let key = DiskCache::compute_fingerprint("Hello R O I world", "en", None, 1.0);
        let audio = SynthesizedAudio::new(vec![0x49, 0x44, 0x33, 0x00, 0xff, 0x10], AudioFormat::Mp3);

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &audio).await;
        assert_eq!(cache.get(&key).await, Some(audio));

        let file = cache.dir().join(format!("{}.mp3", key));
        assert!(file.exists(), "entry should be a flat file named by fingerprint");
    }

    #[tokio::test]
    async fn test_wav_entry_keeps_its_format() {
        let (cache, _tmp) = open_temp(500).await;
        let key = DiskCache::compute_fingerprint("offline", "en", None, 1.0);
        let audio = SynthesizedAudio::new(b"RIFF....WAVE".to_vec(), AudioFormat::Wav);
        cache.put(&key, &audio).await;
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.format, AudioFormat::Wav);
        assert_eq!(hit.mime_type(), "audio/wav");
    }

    #[tokio::test]
    async fn test_overwrite_same_key_replaces_other_format() {
        let (cache, _tmp) = open_temp(500).await;
        let key = DiskCache::compute_fingerprint("twice", "en", None, 1.0);
        cache
            .put(&key, &SynthesizedAudio::new(b"wav".to_vec(), AudioFormat::Wav))
            .await;
        cache
            .put(&key, &SynthesizedAudio::new(b"mp3".to_vec(), AudioFormat::Mp3))
            .await;
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.data, b"mp3");
        assert!(!cache.dir().join(format!("{}.wav", key)).exists());
    }

    #[tokio::test]
    async fn test_missing_dir_degrades_to_miss_and_swallowed_write() {
        let (cache, tmp) = open_temp(500).await;
        std::fs::remove_dir_all(tmp.path().join("cache")).unwrap();

        let key = DiskCache::compute_fingerprint("gone", "en", None, 1.0);
        cache
            .put(&key, &SynthesizedAudio::new(b"abc".to_vec(), AudioFormat::Mp3))
            .await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.usage().await.entries, 0);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let (cache, _tmp) = open_temp(500).await;
        let key = DiskCache::compute_fingerprint("dir", "en", None, 1.0);
        // A directory where the file should be makes the read fail.
        std::fs::create_dir_all(cache.dir().join(format!("{}.mp3", key))).unwrap();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_usage_reports_advisory_ceiling() {
        let (cache, _tmp) = open_temp(0).await;
        let key = DiskCache::compute_fingerprint("big", "en", None, 1.0);
        cache
            .put(&key, &SynthesizedAudio::new(vec![7u8; 2048], AudioFormat::Mp3))
            .await;
        std::fs::write(cache.dir().join("notes.txt"), b"ignored").unwrap();

        let usage = cache.usage().await;
        assert_eq!(usage.entries, 1);
        assert_eq!(usage.total_bytes, 2048);
        assert!(usage.over_capacity);
        // Still readable: the ceiling is never enforced.
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_distinct_keys() {
        let (cache, _tmp) = open_temp(500).await;
        let mut handles = Vec::new();
        for i in 0..16u8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = DiskCache::compute_fingerprint(&format!("line {}", i), "en", None, 1.0);
                cache
                    .put(&key, &SynthesizedAudio::new(vec![i; 64], AudioFormat::Mp3))
                    .await;
                cache.get(&key).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let hit = handle.await.unwrap().expect("entry should be readable");
            assert_eq!(hit.data, vec![i as u8; 64]);
        }
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_deterministic(
            text in ".{0,40}",
            lang in "[a-z]{2}",
            voice in proptest::option::of("[A-Za-z-]{1,20}"),
            speed in 0.5f32..2.0,
        ) {
            let a = Fingerprint::compute(&text, &lang, voice.as_deref(), speed);
            let b = Fingerprint::compute(&text, &lang, voice.as_deref(), speed);
            prop_assert_eq!(a, b);
        }
    }
}
