//! Playback session and media-session integration

use crate::track::TrackDescriptor;
use serde::Serialize;

/// Transport state of the now-playing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Nothing loaded
    #[default]
    Idle,
    /// A load is in flight
    Loading,
    /// Audibly playing
    Playing,
    /// Loaded and held
    Paused,
    /// Played to the end
    Ended,
}

/// The single "now playing" slot.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSession {
    /// Track being played, when started through `play_track`
    pub track: Option<TrackDescriptor>,
    /// Source URL of the most recent load
    pub src: Option<String>,
    /// Transport state
    pub state: TransportState,
    /// Epoch of the most recently requested load
    pub load_epoch: u64,
    /// Whether the source plays without analysis (cross-origin fallback)
    pub degraded: bool,
}

/// Artwork entry for OS media controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artwork {
    /// Image URL
    pub src: String,
    /// `WxH`
    pub sizes: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime: String,
}

/// Artwork sizes published for every track.
pub const ARTWORK_SIZES: [u32; 6] = [96, 128, 192, 256, 384, 512];

/// Metadata published to OS media controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMetadata {
    /// Track title
    pub title: String,
    /// Artist line
    pub artist: String,
    /// Album name
    pub album: String,
    /// Artwork at every published size
    pub artwork: Vec<Artwork>,
}

impl MediaMetadata {
    /// Metadata for `track`.
    pub fn for_track(track: &TrackDescriptor) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork: ARTWORK_SIZES
                .iter()
                .map(|s| Artwork {
                    src: track.cover_url.clone(),
                    sizes: format!("{s}x{s}"),
                    mime: "image/jpeg".into(),
                })
                .collect(),
        }
    }
}

/// Action requested by OS media controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaAction {
    /// Resume
    Play,
    /// Pause
    Pause,
    /// Skip forward
    NextTrack,
    /// Skip back
    PreviousTrack,
    /// Jump to a position in seconds
    SeekTo(f64),
}

type Handler = Box<dyn Fn() + Send + Sync>;

/// UI hooks invoked after the engine has handled a media action.
#[derive(Default)]
pub struct MediaSessionHandlers {
    /// After play
    pub on_play: Option<Handler>,
    /// After pause
    pub on_pause: Option<Handler>,
    /// Next track requested
    pub on_next: Option<Handler>,
    /// Previous track requested
    pub on_prev: Option<Handler>,
}

impl MediaSessionHandlers {
    pub(crate) fn fire(&self, action: MediaAction) {
        let handler = match action {
            MediaAction::Play => self.on_play.as_ref(),
            MediaAction::Pause => self.on_pause.as_ref(),
            MediaAction::NextTrack => self.on_next.as_ref(),
            MediaAction::PreviousTrack => self.on_prev.as_ref(),
            MediaAction::SeekTo(_) => None,
        };
        if let Some(f) = handler {
            f();
        }
    }
}

impl std::fmt::Debug for MediaSessionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSessionHandlers")
            .field("on_play", &self.on_play.is_some())
            .field("on_pause", &self.on_pause.is_some())
            .field("on_next", &self.on_next.is_some())
            .field("on_prev", &self.on_prev.is_some())
            .finish()
    }
}
