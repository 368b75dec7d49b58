//! Track descriptor
//!
//! Normalized, immutable description of a playable track, whatever catalog it
//! came from.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Playable track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    /// Catalog-scoped identifier
    pub id: String,
    /// Track title
    pub title: String,
    /// Artist line
    pub artist: String,
    /// Album name
    pub album: String,
    /// Cover art URL
    pub cover_url: String,
    /// Duration in seconds
    pub duration: u32,
    /// Primary stream URL
    pub stream_url: String,
    /// Fallback / preview URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Quality label of the primary stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl TrackDescriptor {
    /// Synthetic descriptor pointing at the bundled demo asset.
    pub fn placeholder(query: &str, demo_url: &str) -> Self {
        Self {
            id: format!("fallback_{}", unix_millis()),
            title: query.to_string(),
            artist: "System".to_string(),
            album: "Unknown".to_string(),
            cover_url: random_cover_url(),
            duration: 180,
            stream_url: demo_url.to_string(),
            preview_url: None,
            quality: None,
        }
    }

    /// Whether this descriptor is a synthetic placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with("fallback_")
    }

    /// URL to load: primary stream, then preview, then `demo_url`.
    pub fn playable_url<'a>(&'a self, demo_url: &'a str) -> &'a str {
        if !self.stream_url.is_empty() {
            &self.stream_url
        } else {
            self.preview_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .unwrap_or(demo_url)
        }
    }
}

/// Milliseconds since the epoch, for generated identifiers.
pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Random placeholder artwork.
pub(crate) fn random_cover_url() -> String {
    format!("https://picsum.photos/400/400?random={}", rand::random::<u32>() % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_shape() {
        let t = TrackDescriptor::placeholder("night drive", "https://demo/track.mp3");
        assert!(t.is_placeholder());
        assert_eq!(t.title, "night drive");
        assert_eq!(t.artist, "System");
        assert_eq!(t.duration, 180);
        assert_eq!(t.stream_url, "https://demo/track.mp3");
    }

    #[test]
    fn test_playable_url_fallbacks() {
        let mut t = TrackDescriptor::placeholder("q", "demo");
        t.stream_url = String::new();
        t.preview_url = Some("preview".into());
        assert_eq!(t.playable_url("demo"), "preview");
        t.preview_url = None;
        assert_eq!(t.playable_url("demo"), "demo");
    }

    #[test]
    fn test_serde_field_names() {
        let t = TrackDescriptor::placeholder("q", "demo");
        let json = serde_json::to_value(&t).unwrap();
        assert!(json.get("coverUrl").is_some());
        assert!(json.get("streamUrl").is_some());
        assert!(json.get("previewUrl").is_none());
    }
}
