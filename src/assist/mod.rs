//! Generative-text collaborator
//!
//! Lyrics, artist bios, queue reordering, "vibe" search queries and EQ
//! suggestions. Every request has a deterministic fallback, so callers never
//! see an error: a missing key, a failed request and a malformed reply each
//! map to a fixed answer.

mod gemini;

pub use gemini::GeminiClient;

use crate::config::AssistConfig;
use crate::dsp::equalizer::clamp_gain;
use crate::dsp::EQ_BAND_COUNT;
use crate::error::AssistError;
use crate::track::{random_cover_url, unix_millis, TrackDescriptor};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend that turns a prompt into text.
#[async_trait]
pub trait TextAssistant: Send + Sync {
    /// Generate a reply. With `json` set the backend is asked for a JSON body.
    async fn generate(&self, prompt: &str, json: bool) -> Result<String, AssistError>;
}

/// Artist card.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistInfo {
    /// Artist name as queried
    pub name: String,
    /// Short biography (fallback text when the assistant is unavailable)
    pub bio: String,
    /// Portrait URL
    pub image_url: String,
    /// Popular tracks resolved through the catalogs
    pub top_tracks: Vec<TrackDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BioReply {
    bio: Option<String>,
    #[serde(default)]
    top_hits: Vec<TopHit>,
}

#[derive(Debug, Deserialize)]
struct TopHit {
    title: Option<String>,
    album: Option<String>,
}

const DEFAULT_LANGUAGES: &str = "Hindi, English";

/// Facade with fallbacks over an optional backend.
#[derive(Clone)]
pub struct Assistant {
    backend: Option<Arc<dyn TextAssistant>>,
    demo_url: String,
}

impl Assistant {
    /// Assistant from configuration. Without an API key every request falls
    /// back immediately.
    pub fn new(config: &AssistConfig, demo_url: &str) -> Self {
        let backend = match GeminiClient::new(config) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn TextAssistant>),
            Err(AssistError::Unavailable) => None,
            Err(e) => {
                warn!(error = %e, "assistant client could not be built");
                None
            }
        };
        Self {
            backend,
            demo_url: demo_url.to_string(),
        }
    }

    /// Assistant over a custom backend.
    pub fn with_backend(backend: Arc<dyn TextAssistant>, demo_url: &str) -> Self {
        Self {
            backend: Some(backend),
            demo_url: demo_url.to_string(),
        }
    }

    /// Assistant with no backend at all.
    pub fn unavailable(demo_url: &str) -> Self {
        Self {
            backend: None,
            demo_url: demo_url.to_string(),
        }
    }

    /// Whether a backend is configured.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Lyrics for `song` by `artist`.
    pub async fn lyrics(&self, song: &str, artist: &str) -> String {
        let Some(backend) = &self.backend else {
            return "Lyrics unavailable (API Key missing).".into();
        };
        let prompt = format!(
            "Generate synchronized style lyrics for the song \"{song}\" by \"{artist}\". Format nicely with stanzas."
        );
        match backend.generate(&prompt, false).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => "Lyrics not found.".into(),
            Err(e) => {
                debug!(error = %e, "lyrics request failed");
                "Could not load lyrics.".into()
            }
        }
    }

    /// `queue` reordered for musical flow after `current`.
    ///
    /// Titles named in the reply come first, in reply order; everything else
    /// follows in its original order. Short queues, a missing backend and
    /// unusable replies get a random shuffle instead.
    pub async fn reorder_queue(
        &self,
        current: &TrackDescriptor,
        queue: &[TrackDescriptor],
    ) -> Vec<TrackDescriptor> {
        let backend = match &self.backend {
            Some(b) if queue.len() >= 3 => b,
            _ => return shuffled(queue),
        };
        let songs = queue
            .iter()
            .map(|s| format!("{} - {}", s.title, s.artist))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "I am listening to \"{}\" by \"{}\".\nUpcoming songs: {songs}\nReorder this list for the best musical flow. Return ONLY a JSON array of strings.",
            current.title, current.artist
        );
        let titles = match backend.generate(&prompt, true).await {
            Ok(text) => serde_json::from_str::<Vec<String>>(text.trim()),
            Err(e) => {
                debug!(error = %e, "reorder request failed");
                return shuffled(queue);
            }
        };
        match titles {
            Ok(titles) => apply_order(queue, &titles),
            Err(e) => {
                debug!(error = %e, "reorder reply malformed");
                shuffled(queue)
            }
        }
    }

    /// Short mood search query for tracks like `current`.
    pub async fn vibe_query(&self, current: &TrackDescriptor, languages: &[String]) -> String {
        let Some(backend) = &self.backend else {
            return format!("{} similar songs", current.artist);
        };
        let languages = if languages.is_empty() {
            DEFAULT_LANGUAGES.to_string()
        } else {
            languages.join(", ")
        };
        let prompt = format!(
            "Mood search query (max 4 words) for a song like \"{}\" in {languages}.",
            current.title
        );
        match backend.generate(&prompt, false).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => format!("{} radio", current.artist),
            Err(e) => {
                debug!(error = %e, "vibe request failed");
                format!("{} mix", current.artist)
            }
        }
    }

    /// Short bio and top hits for `artist`. Hits play the demo track.
    pub async fn artist_bio(&self, artist: &str) -> ArtistInfo {
        let Some(backend) = &self.backend else {
            return ArtistInfo {
                name: artist.to_string(),
                bio: "Bio unavailable.".into(),
                image_url: random_cover_url(),
                top_tracks: Vec::new(),
            };
        };
        let prompt = format!(
            "Short bio and 3 top hits for \"{artist}\". Return JSON with \"bio\" (string) and \"topHits\" (array of {{title, album}})."
        );
        let reply = backend
            .generate(&prompt, true)
            .await
            .and_then(|text| parse_bio(&text));
        match reply {
            Ok(reply) => {
                let stamp = unix_millis();
                let top_tracks = reply
                    .top_hits
                    .into_iter()
                    .filter_map(|hit| Some((hit.title?, hit.album)))
                    .enumerate()
                    .map(|(i, (title, album))| TrackDescriptor {
                        id: format!("artist_top_{i}_{stamp}"),
                        title,
                        artist: artist.to_string(),
                        album: album.unwrap_or_else(|| "Greatest Hits".into()),
                        cover_url: random_cover_url(),
                        duration: 200,
                        stream_url: self.demo_url.clone(),
                        preview_url: None,
                        quality: None,
                    })
                    .collect();
                ArtistInfo {
                    name: artist.to_string(),
                    bio: reply
                        .bio
                        .filter(|b| !b.trim().is_empty())
                        .unwrap_or_else(|| "No bio available.".into()),
                    image_url: random_cover_url(),
                    top_tracks,
                }
            }
            Err(e) => {
                debug!(error = %e, "bio request failed");
                ArtistInfo {
                    name: artist.to_string(),
                    bio: "Fetch error.".into(),
                    image_url: String::new(),
                    top_tracks: Vec::new(),
                }
            }
        }
    }

    /// Suggested six-band gains in dB for `song` by `artist`, flat on failure.
    pub async fn eq_suggestion(&self, song: &str, artist: &str) -> [f32; EQ_BAND_COUNT] {
        let flat = [0.0; EQ_BAND_COUNT];
        let Some(backend) = &self.backend else {
            return flat;
        };
        let prompt = format!(
            "6-band EQ (-8 to 8 dB) for \"{song}\" by \"{artist}\". Frequencies: 60Hz, 200Hz, 500Hz, 1kHz, 4kHz, 10kHz. Return ONLY a JSON array of 6 numbers."
        );
        match backend
            .generate(&prompt, true)
            .await
            .and_then(|text| parse_gains(&text))
        {
            Ok(gains) => gains,
            Err(e) => {
                debug!(error = %e, "eq suggestion unusable");
                flat
            }
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("available", &self.is_available())
            .field("demo_url", &self.demo_url)
            .finish()
    }
}

fn shuffled(queue: &[TrackDescriptor]) -> Vec<TrackDescriptor> {
    let mut out = queue.to_vec();
    out.shuffle(&mut rand::rng());
    out
}

/// Tracks whose title is contained in a reply title move to the front, in
/// reply order; the rest keep their order.
fn apply_order(queue: &[TrackDescriptor], titles: &[String]) -> Vec<TrackDescriptor> {
    let mut taken = vec![false; queue.len()];
    let mut out = Vec::with_capacity(queue.len());
    for title in titles {
        let title = title.to_lowercase();
        let found = queue
            .iter()
            .enumerate()
            .find(|(i, s)| !taken[*i] && title.contains(&s.title.to_lowercase()));
        if let Some((i, song)) = found {
            taken[i] = true;
            out.push(song.clone());
        }
    }
    out.extend(
        queue
            .iter()
            .zip(&taken)
            .filter(|(_, t)| !**t)
            .map(|(s, _)| s.clone()),
    );
    out
}

fn parse_bio(text: &str) -> Result<BioReply, AssistError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(BioReply {
            bio: None,
            top_hits: Vec::new(),
        });
    }
    serde_json::from_str(text).map_err(|e| AssistError::Malformed(e.to_string()))
}

fn parse_gains(text: &str) -> Result<[f32; EQ_BAND_COUNT], AssistError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| AssistError::Malformed(e.to_string()))?;
    let items = value
        .as_array()
        .filter(|a| a.len() == EQ_BAND_COUNT)
        .ok_or_else(|| AssistError::Malformed(format!("expected {EQ_BAND_COUNT} gains")))?;
    let mut gains = [0.0; EQ_BAND_COUNT];
    for (gain, item) in gains.iter_mut().zip(items) {
        let db = item
            .as_f64()
            .ok_or_else(|| AssistError::Malformed(format!("not a number: {item}")))?;
        *gain = clamp_gain(db as f32);
    }
    Ok(gains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Canned {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<(String, bool)>>,
    }

    impl Canned {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextAssistant for Canned {
        async fn generate(&self, prompt: &str, json: bool) -> Result<String, AssistError> {
            self.prompts.lock().push((prompt.to_string(), json));
            self.reply
                .clone()
                .map_err(|_| AssistError::Malformed("scripted failure".into()))
        }
    }

    fn song(title: &str) -> TrackDescriptor {
        let mut t = TrackDescriptor::placeholder(title, "demo");
        t.artist = "Band".into();
        t
    }

    #[tokio::test]
    async fn test_lyrics_fallbacks() {
        let none = Assistant::unavailable("demo");
        assert_eq!(none.lyrics("a", "b").await, "Lyrics unavailable (API Key missing).");

        let failing = Assistant::with_backend(Canned::failing(), "demo");
        assert_eq!(failing.lyrics("a", "b").await, "Could not load lyrics.");

        let empty = Assistant::with_backend(Canned::ok(""), "demo");
        assert_eq!(empty.lyrics("a", "b").await, "Lyrics not found.");

        let ok = Assistant::with_backend(Canned::ok("la la"), "demo");
        assert_eq!(ok.lyrics("a", "b").await, "la la");
    }

    #[tokio::test]
    async fn test_reorder_matches_titles_first() {
        let queue = vec![song("Alpha"), song("Bravo"), song("Charlie"), song("Delta")];
        let backend = Canned::ok(r#"["Charlie - Band", "alpha - band", "Nope"]"#);
        let assistant = Assistant::with_backend(backend.clone(), "demo");
        let out = assistant.reorder_queue(&song("Now"), &queue).await;
        let titles: Vec<&str> = out.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Charlie", "Alpha", "Bravo", "Delta"]);
        assert!(backend.prompts.lock()[0].1, "reorder asks for JSON");
    }

    #[tokio::test]
    async fn test_reorder_short_or_malformed_keeps_members() {
        let backend = Canned::ok("not json");
        let assistant = Assistant::with_backend(backend.clone(), "demo");

        let short = vec![song("A"), song("B")];
        let out = assistant.reorder_queue(&song("Now"), &short).await;
        assert_eq!(out.len(), 2);
        assert!(backend.prompts.lock().is_empty(), "short queues skip the backend");

        let queue = vec![song("A"), song("B"), song("C")];
        let mut out = assistant.reorder_queue(&song("Now"), &queue).await;
        out.sort_by(|a, b| a.title.cmp(&b.title));
        assert_eq!(out, queue);
    }

    #[tokio::test]
    async fn test_vibe_query_fallbacks() {
        let current = song("Midnight");
        let none = Assistant::unavailable("demo");
        assert_eq!(none.vibe_query(&current, &[]).await, "Band similar songs");

        let failing = Assistant::with_backend(Canned::failing(), "demo");
        assert_eq!(failing.vibe_query(&current, &[]).await, "Band mix");

        let empty = Assistant::with_backend(Canned::ok("  "), "demo");
        assert_eq!(empty.vibe_query(&current, &[]).await, "Band radio");

        let backend = Canned::ok(" late night drive \n");
        let ok = Assistant::with_backend(backend.clone(), "demo");
        assert_eq!(ok.vibe_query(&current, &[]).await, "late night drive");
        assert!(backend.prompts.lock()[0].0.contains(DEFAULT_LANGUAGES));
    }

    #[tokio::test]
    async fn test_artist_bio_maps_hits() {
        let backend = Canned::ok(
            r#"{"bio": "A band.", "topHits": [{"title": "One", "album": "First"}, {"title": "Two"}, {"album": "x"}]}"#,
        );
        let info = Assistant::with_backend(backend, "https://demo/track.mp3")
            .artist_bio("Band")
            .await;
        assert_eq!(info.bio, "A band.");
        assert_eq!(info.top_tracks.len(), 2);
        assert_eq!(info.top_tracks[1].album, "Greatest Hits");
        assert_eq!(info.top_tracks[0].duration, 200);
        assert_eq!(info.top_tracks[0].stream_url, "https://demo/track.mp3");
        assert!(info.top_tracks[0].id.starts_with("artist_top_0_"));
    }

    #[tokio::test]
    async fn test_artist_bio_fallbacks() {
        let none = Assistant::unavailable("demo").artist_bio("X").await;
        assert_eq!(none.bio, "Bio unavailable.");

        let broken = Assistant::with_backend(Canned::ok("{oops"), "demo")
            .artist_bio("X")
            .await;
        assert_eq!(broken.bio, "Fetch error.");
        assert!(broken.image_url.is_empty());

        let bare = Assistant::with_backend(Canned::ok("{}"), "demo")
            .artist_bio("X")
            .await;
        assert_eq!(bare.bio, "No bio available.");
    }

    #[tokio::test]
    async fn test_eq_suggestion() {
        let ok = Assistant::with_backend(Canned::ok("[1, 2, 3, -4, 20, 0.5]"), "demo");
        assert_eq!(ok.eq_suggestion("s", "a").await, [1.0, 2.0, 3.0, -4.0, 12.0, 0.5]);

        let wrong_len = Assistant::with_backend(Canned::ok("[1, 2]"), "demo");
        assert_eq!(wrong_len.eq_suggestion("s", "a").await, [0.0; 6]);

        assert_eq!(
            Assistant::unavailable("demo").eq_suggestion("s", "a").await,
            [0.0; 6]
        );
    }
}
