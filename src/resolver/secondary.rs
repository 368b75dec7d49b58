//! Secondary catalog (iTunes Search API)

use super::entities::decode_html_entities;
use crate::track::TrackDescriptor;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

/// Quality label for preview clips.
pub const PREVIEW_QUALITY: &str = "Preview (iTunes)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SongResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongResult {
    track_id: Option<u64>,
    track_name: Option<String>,
    artist_name: Option<String>,
    collection_name: Option<String>,
    artwork_url100: Option<String>,
    track_time_millis: Option<u64>,
    preview_url: Option<String>,
}

/// Search URL for the secondary catalog.
pub fn search_url(base: &str, query: &str, limit: usize) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    url.query_pairs_mut()
        .append_pair("term", query)
        .append_pair("media", "music")
        .append_pair("limit", &limit.to_string())
        .append_pair("entity", "song");
    Some(url.into())
}

/// Normalize a search response. Entries without a preview are dropped.
pub fn normalize(body: Value) -> Vec<TrackDescriptor> {
    let Ok(response) = serde_json::from_value::<SearchResponse>(body) else {
        return Vec::new();
    };
    response
        .results
        .into_iter()
        .filter_map(|r| {
            let preview = r.preview_url.filter(|u| !u.is_empty())?;
            Some(TrackDescriptor {
                id: format!("itunes_{}", r.track_id.unwrap_or_default()),
                title: decode_html_entities(r.track_name.as_deref().unwrap_or("Unknown Song")),
                artist: decode_html_entities(r.artist_name.as_deref().unwrap_or("Unknown Artist")),
                album: decode_html_entities(r.collection_name.as_deref().unwrap_or("Single")),
                cover_url: r
                    .artwork_url100
                    .map(|u| u.replace("100x100", "600x600"))
                    .unwrap_or_default(),
                duration: r
                    .track_time_millis
                    .map(|ms| (ms / 1000) as u32)
                    .filter(|&s| s > 0)
                    .unwrap_or(180),
                stream_url: preview.clone(),
                preview_url: Some(preview),
                quality: Some(PREVIEW_QUALITY.to_string()),
            })
        })
        .collect()
}
