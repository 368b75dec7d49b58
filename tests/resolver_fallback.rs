//! Resolver tiers against scripted catalogs.

use async_trait::async_trait;
use harmonix::resolver::CatalogTransport;
use harmonix::{ResolveError, ResolverConfig, TrackResolver};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Body(Value),
    Fail,
    Hang,
}

/// Transport answering by URL prefix.
struct Catalogs {
    routes: Vec<(String, Reply)>,
    requests: Mutex<Vec<String>>,
}

impl Catalogs {
    fn new(routes: Vec<(&str, Reply)>) -> Arc<Self> {
        Arc::new(Self {
            routes: routes
                .into_iter()
                .map(|(p, r)| (p.to_string(), r))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CatalogTransport for Catalogs {
    async fn get_json(&self, url: &str) -> Result<Value, ResolveError> {
        self.requests.lock().push(url.to_string());
        let reply = self
            .routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or(Reply::Fail);
        match reply {
            Reply::Body(v) => Ok(v),
            Reply::Fail => Err(ResolveError::InvalidPayload("scripted".into())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ResolveError::InvalidPayload("unreachable".into()))
            }
        }
    }
}

fn config() -> ResolverConfig {
    ResolverConfig {
        primary_mirrors: vec![
            "https://m1.test/api".into(),
            "https://m2.test/api".into(),
            "https://m3.test/api".into(),
        ],
        secondary_url: "https://second.test/search".into(),
        demo_track_url: "https://demo.test/track.mp3".into(),
        ..ResolverConfig::default()
    }
}

fn primary_body() -> Value {
    json!({
        "success": true,
        "data": { "results": [
            {
                "id": "abc",
                "name": "Tum Hi Ho",
                "primaryArtists": "Arijit Singh",
                "album": { "name": "Aashiqui 2" },
                "duration": "262",
                "image": [{"link": "s"}, {"link": "m"}, {"link": "l"}],
                "downloadUrl": [
                    {"quality": "96kbps", "link": "https://cdn.test/96.mp4"},
                    {"quality": "320kbps", "link": "https://cdn.test/320.mp4"}
                ]
            },
            { "id": "def", "name": "Second", "primaryArtists": "Someone", "downloadUrl": "https://cdn.test/2.mp4" }
        ]}
    })
}

fn secondary_body() -> Value {
    json!({
        "resultCount": 1,
        "results": [{
            "trackId": 9,
            "trackName": "Preview Song",
            "artistName": "Preview Artist",
            "collectionName": "Preview Album",
            "artworkUrl100": "https://art.test/100x100bb.jpg",
            "trackTimeMillis": 200000,
            "previewUrl": "https://audio.test/preview.m4a"
        }]
    })
}

#[tokio::test(start_paused = true)]
async fn placeholder_when_every_catalog_fails() {
    let catalogs = Catalogs::new(vec![]);
    let resolver = TrackResolver::with_transport(catalogs.clone(), config());

    let tracks = resolver.resolve("midnight city", 10).await;
    assert_eq!(tracks.len(), 1);
    let t = &tracks[0];
    assert!(t.is_placeholder());
    assert_eq!(t.title, "midnight city");
    assert_eq!(t.stream_url, "https://demo.test/track.mp3");
    assert_eq!(catalogs.requests.lock().len(), 4, "three mirrors and the secondary");
}

#[tokio::test(start_paused = true)]
async fn placeholder_when_every_catalog_is_empty() {
    let empty_primary = json!({ "success": true, "data": { "results": [] } });
    let catalogs = Catalogs::new(vec![
        ("https://m1.test", Reply::Body(empty_primary.clone())),
        ("https://m2.test", Reply::Body(empty_primary.clone())),
        ("https://m3.test", Reply::Body(empty_primary)),
        (
            "https://second.test",
            Reply::Body(json!({ "resultCount": 0, "results": [] })),
        ),
    ]);
    let resolver = TrackResolver::with_transport(catalogs.clone(), config());

    let tracks = resolver.resolve("nothing matches", 10).await;
    assert_eq!(tracks.len(), 1);
    assert!(tracks[0].is_placeholder());
    assert_eq!(tracks[0].title, "nothing matches");
    assert_eq!(tracks[0].stream_url, "https://demo.test/track.mp3");
    let requests = catalogs.requests.lock();
    assert!(requests.iter().any(|u| u.starts_with("https://second.test")));
}

#[tokio::test(start_paused = true)]
async fn malformed_and_hanging_mirrors_fall_through_to_secondary() {
    let catalogs = Catalogs::new(vec![
        ("https://m1.test", Reply::Body(json!({"unexpected": true}))),
        ("https://m2.test", Reply::Body(json!("not an object"))),
        ("https://m3.test", Reply::Hang),
        ("https://second.test", Reply::Body(secondary_body())),
    ]);
    let resolver = TrackResolver::with_transport(catalogs, config());

    let tracks = resolver.resolve("song", 5).await;
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id, "itunes_9");
    assert_eq!(tracks[0].stream_url, "https://audio.test/preview.m4a");
    assert_eq!(tracks[0].cover_url, "https://art.test/600x600bb.jpg");
}

#[tokio::test(start_paused = true)]
async fn first_valid_mirror_wins() {
    let catalogs = Catalogs::new(vec![
        ("https://m1.test", Reply::Hang),
        ("https://m2.test", Reply::Fail),
        ("https://m3.test", Reply::Body(primary_body())),
        ("https://second.test", Reply::Body(secondary_body())),
    ]);
    let resolver = TrackResolver::with_transport(catalogs.clone(), config());

    let tracks = resolver.resolve("tum hi ho", 1).await;
    assert_eq!(tracks.len(), 1, "limit applies to primary results");
    let t = &tracks[0];
    assert_eq!(t.title, "Tum Hi Ho");
    assert_eq!(t.album, "Aashiqui 2");
    assert_eq!(t.duration, 262);
    assert_eq!(t.stream_url, "https://cdn.test/320.mp4");
    assert!(
        !catalogs
            .requests
            .lock()
            .iter()
            .any(|u| u.starts_with("https://second.test")),
        "secondary is not consulted after a primary hit"
    );
}

#[tokio::test(start_paused = true)]
async fn blank_query_is_empty_without_requests() {
    let catalogs = Catalogs::new(vec![]);
    let resolver = TrackResolver::with_transport(catalogs.clone(), config());
    assert!(resolver.resolve("   ", 10).await.is_empty());
    assert!(catalogs.requests.lock().is_empty());
}
