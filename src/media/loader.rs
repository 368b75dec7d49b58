//! HTTP and file media loading with symphonia decoding

use super::{CorsMode, DecodedAudio, MediaLoader};
use crate::error::MediaError;
use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Origin sent with anonymous cross-origin requests.
const REQUEST_ORIGIN: &str = "http://localhost";

/// Loader for `http(s)://` URLs, `file://` URLs and plain paths.
#[derive(Debug, Clone)]
pub struct HttpMediaLoader {
    client: reqwest::Client,
}

impl HttpMediaLoader {
    /// Loader with a default client.
    pub fn new(timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Loader reusing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_remote(&self, url: &str, cors: CorsMode) -> Result<Vec<u8>, MediaError> {
        let mut request = self.client.get(url);
        if cors == CorsMode::Anonymous {
            request = request.header(reqwest::header::ORIGIN, REQUEST_ORIGIN);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| MediaError::Network(e.to_string()))?;

        if cors == CorsMode::Anonymous
            && !response
                .headers()
                .contains_key(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
        {
            return Err(MediaError::CrossOriginDenied(url.to_string()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MediaLoader for HttpMediaLoader {
    async fn open(&self, url: &str, cors: CorsMode) -> Result<DecodedAudio, MediaError> {
        let hint = extension_hint(url);
        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_remote(url, cors).await?
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url).to_string();
            tokio::task::spawn_blocking(move || std::fs::read(&path))
                .await
                .map_err(|e| MediaError::Network(e.to_string()))?
                .map_err(|e| MediaError::Network(format!("{url}: {e}")))?
        };
        debug!(url, bytes = bytes.len(), "media fetched");

        tokio::task::spawn_blocking(move || decode_bytes(bytes, hint.as_deref()))
            .await
            .map_err(|e| MediaError::Decode(e.to_string()))?
    }
}

fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Decode a complete file held in memory to stereo.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, MediaError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::Unsupported(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| MediaError::Unsupported("no default track".into()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::Unsupported(e.to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "skipping undecodable packet");
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(MediaError::Decode(e.to_string())),
        }
    }

    let rate = sample_rate.ok_or_else(|| MediaError::Decode("unknown sample rate".into()))?;
    let channels = channels.unwrap_or(2);
    if samples.is_empty() {
        return Err(MediaError::Decode("no audio frames".into()));
    }
    Ok(DecodedAudio::from_interleaved(rate, channels, &samples))
}

#[cfg(all(test, feature = "export"))]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames * channels as usize {
                writer.write_sample(((i % 100) as i16) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_wav_to_stereo() {
        let audio = decode_bytes(wav_bytes(1, 22_050, 2_205), Some("wav")).unwrap();
        assert_eq!(audio.sample_rate(), 22_050);
        assert_eq!(audio.frames(), 2_205);
        let s = audio.samples();
        assert_eq!(s[2], s[3], "mono duplicated to both sides");
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let err = decode_bytes(vec![0x42; 512], None).unwrap_err();
        assert!(matches!(err, MediaError::Unsupported(_)));
    }

    #[test]
    fn test_extension_hint_ignores_query() {
        assert_eq!(
            extension_hint("https://cdn/x/track.MP3?filename=a.mp3").as_deref(),
            Some("mp3")
        );
        assert_eq!(extension_hint("https://cdn/stream"), None);
    }

    #[tokio::test]
    async fn test_open_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, wav_bytes(2, 44_100, 441)).unwrap();
        let loader = HttpMediaLoader::new(Duration::from_secs(1)).unwrap();
        let url = format!("file://{}", path.display());
        let audio = loader.open(&url, CorsMode::Anonymous).await.unwrap();
        assert_eq!(audio.frames(), 441);
        assert!(loader
            .open("/definitely/not/here.wav", CorsMode::None)
            .await
            .is_err());
    }
}
