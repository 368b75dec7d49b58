//! Primary catalog (JioSaavn-compatible mirrors)
//!
//! Mirrors disagree on envelope and field shapes, so normalization reads the
//! raw JSON defensively instead of deserializing into a fixed struct.

use super::entities::decode_html_entities;
use crate::track::{random_cover_url, unix_millis, TrackDescriptor};
use reqwest::Url;
use serde_json::Value;

/// Bitrate tiers, best first: `(quality label, token looked for in the link)`.
pub const QUALITY_TIERS: [(&str, &str); 3] =
    [("320kbps", "320"), ("160kbps", "160"), ("96kbps", "96")];

/// Search URL for one mirror.
pub fn search_url(base: &str, query: &str, limit: usize) -> Option<String> {
    let mut url = Url::parse(&format!("{}/search/songs", base.trim_end_matches('/'))).ok()?;
    url.query_pairs_mut()
        .append_pair("query", query)
        .append_pair("limit", &limit.to_string());
    Some(url.into())
}

/// The results array of a response, wherever the mirror put it.
pub fn results(body: &Value) -> Option<&Vec<Value>> {
    body.pointer("/data/results")
        .and_then(Value::as_array)
        .or_else(|| body.get("results").and_then(Value::as_array))
        .or_else(|| body.get("data").and_then(Value::as_array))
}

fn link(entry: &Value) -> Option<&str> {
    entry
        .get("link")
        .or_else(|| entry.get("url"))
        .and_then(Value::as_str)
}

/// Best stream URL from a `downloadUrl` field.
///
/// Prefers the highest tier present (by `quality` label or by the tier name
/// appearing in the link), falls back to the last entry. A plain string is
/// used as-is.
pub fn select_stream_url(download: &Value) -> Option<(String, Option<String>)> {
    if let Some(s) = download.as_str() {
        return (!s.is_empty()).then(|| (s.to_string(), None));
    }
    let entries = download.as_array()?;
    for (tier, token) in QUALITY_TIERS {
        let hit = entries.iter().find(|e| {
            e.get("quality").and_then(Value::as_str) == Some(tier)
                || link(e).is_some_and(|l| l.contains(token))
        });
        if let Some(url) = hit.and_then(link) {
            return Some((url.to_string(), Some(tier.to_string())));
        }
    }
    let last = entries.last()?;
    let quality = last
        .get("quality")
        .and_then(Value::as_str)
        .map(str::to_string);
    link(last).map(|l| (l.to_string(), quality))
}

fn select_image(image: Option<&Value>) -> String {
    match image {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Array(entries)) => [2usize, 1, 0]
            .iter()
            .filter_map(|&i| entries.get(i).and_then(link))
            .next()
            .map(str::to_string)
            .unwrap_or_else(random_cover_url),
        _ => random_cover_url(),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(decode_html_entities(s)),
        _ => None,
    }
}

fn duration(value: Option<&Value>) -> u32 {
    let seconds = match value {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as u32),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    seconds.filter(|&d| d > 0).unwrap_or(180)
}

/// Normalize one result entry.
pub fn normalize(entry: &Value, demo_url: &str) -> TrackDescriptor {
    let title = text(entry.get("name"))
        .or_else(|| text(entry.get("title")))
        .unwrap_or_else(|| "Unknown Song".into());
    let artist = text(entry.get("primaryArtists"))
        .or_else(|| text(entry.get("singers")))
        .or_else(|| text(entry.get("artist")))
        .or_else(|| {
            // Newer mirrors nest artists as objects
            entry
                .pointer("/artists/primary")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a.get("name").and_then(Value::as_str))
                        .map(decode_html_entities)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "Unknown Artist".into());
    let album = text(entry.pointer("/album/name"))
        .or_else(|| text(entry.get("album")))
        .unwrap_or_else(|| "Single".into());

    let stream = entry
        .get("downloadUrl")
        .and_then(select_stream_url)
        .or_else(|| {
            entry
                .get("media_url")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| (s.to_string(), None))
        });
    let preview_url = stream.as_ref().map(|(url, _)| url.clone());
    let (stream_url, quality) = stream.unwrap_or_else(|| (demo_url.to_string(), None));

    let id = match entry.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("saavn_{}_{}", unix_millis(), rand::random::<u32>()),
    };

    TrackDescriptor {
        id,
        title,
        artist,
        album,
        cover_url: select_image(entry.get("image")),
        duration: duration(entry.get("duration")),
        stream_url,
        preview_url,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("https://saavn.dev/api/", "a&b c", 10).unwrap();
        assert_eq!(url, "https://saavn.dev/api/search/songs?query=a%26b+c&limit=10");
    }

    #[test]
    fn test_results_envelopes() {
        assert_eq!(results(&json!({"data": {"results": [1]}})).map(Vec::len), Some(1));
        assert_eq!(results(&json!({"results": [1, 2]})).map(Vec::len), Some(2));
        assert_eq!(results(&json!({"data": [1, 2, 3]})).map(Vec::len), Some(3));
        assert!(results(&json!({"data": {}})).is_none());
    }

    #[test]
    fn test_stream_tier_preference() {
        let download = json!([
            {"quality": "12kbps", "link": "https://x/12.mp4"},
            {"quality": "96kbps", "link": "https://x/96.mp4"},
            {"quality": "160kbps", "url": "https://x/160.mp4"},
        ]);
        assert_eq!(
            select_stream_url(&download),
            Some(("https://x/160.mp4".into(), Some("160kbps".into())))
        );

        let by_link = json!([{"link": "https://x/a_96.mp4"}, {"link": "https://x/a_320.mp4"}]);
        assert_eq!(
            select_stream_url(&by_link),
            Some(("https://x/a_320.mp4".into(), Some("320kbps".into())))
        );

        let bare_160 = json!([{"url": "https://x/b_96.mp4"}, {"url": "https://x/b_160.mp4"}]);
        assert_eq!(select_stream_url(&bare_160).unwrap().0, "https://x/b_160.mp4");

        let odd = json!([{"quality": "48kbps", "link": "https://x/48"}, {"quality": "64kbps", "link": "https://x/64"}]);
        assert_eq!(
            select_stream_url(&odd),
            Some(("https://x/64".into(), Some("64kbps".into())))
        );

        assert_eq!(select_stream_url(&json!("https://x/direct")).unwrap().0, "https://x/direct");
        assert_eq!(select_stream_url(&json!([])), None);
    }

    #[test]
    fn test_normalize_full_entry() {
        let entry = json!({
            "id": "abc",
            "name": "Tum Hi Ho &amp; More",
            "primaryArtists": "Arijit Singh",
            "album": {"name": "Aashiqui 2"},
            "duration": "262",
            "image": [
                {"quality": "50x50", "link": "https://img/50"},
                {"quality": "150x150", "link": "https://img/150"},
                {"quality": "500x500", "link": "https://img/500"}
            ],
            "downloadUrl": [
                {"quality": "96kbps", "link": "https://cdn/96.mp4"},
                {"quality": "320kbps", "link": "https://cdn/320.mp4"}
            ]
        });
        let t = normalize(&entry, "demo");
        assert_eq!(t.id, "abc");
        assert_eq!(t.title, "Tum Hi Ho & More");
        assert_eq!(t.artist, "Arijit Singh");
        assert_eq!(t.album, "Aashiqui 2");
        assert_eq!(t.duration, 262);
        assert_eq!(t.cover_url, "https://img/500");
        assert_eq!(t.stream_url, "https://cdn/320.mp4");
        assert_eq!(t.quality.as_deref(), Some("320kbps"));
        assert_eq!(t.preview_url.as_deref(), Some("https://cdn/320.mp4"));
    }

    #[test]
    fn test_normalize_sparse_entry() {
        let t = normalize(&json!({"title": "X", "media_url": "https://m/1"}), "demo");
        assert_eq!(t.title, "X");
        assert_eq!(t.artist, "Unknown Artist");
        assert_eq!(t.album, "Single");
        assert_eq!(t.duration, 180);
        assert_eq!(t.stream_url, "https://m/1");
        assert!(t.id.starts_with("saavn_"));
        assert!(t.cover_url.starts_with("https://picsum.photos/"));

        assert_eq!(t.preview_url.as_deref(), Some("https://m/1"));

        let t = normalize(&json!({}), "demo");
        assert_eq!(t.title, "Unknown Song");
        assert_eq!(t.stream_url, "demo");
        assert_eq!(t.preview_url, None);
    }

    #[test]
    fn test_nested_artist_objects() {
        let entry = json!({"name": "Y", "artists": {"primary": [{"name": "A"}, {"name": "B &amp; C"}]}});
        assert_eq!(normalize(&entry, "demo").artist, "A, B & C");
    }
}
