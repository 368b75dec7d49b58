//! Error types
//!
//! One enum per concern. Only [`PlaybackError`] and [`HarmonixError`] ever
//! reach a caller of the playback surface; resolver and assistant errors are
//! absorbed into fallbacks inside their modules.

/// Crate-wide error.
#[derive(thiserror::Error, Debug)]
pub enum HarmonixError {
    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Output ring could not be built
    #[cfg(feature = "streaming")]
    #[error(transparent)]
    Ring(#[from] crate::streaming::RingBufferError),

    /// Playback failure surfaced from the engine
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for HarmonixError {
    /// Converts a String into `HarmonixError::Other`.
    ///
    /// Prefer a specific variant where one fits; string errors lose their kind.
    fn from(msg: String) -> Self {
        HarmonixError::Other(msg)
    }
}

impl From<&str> for HarmonixError {
    fn from(msg: &str) -> Self {
        HarmonixError::Other(msg.to_string())
    }
}

impl From<MediaError> for HarmonixError {
    fn from(e: MediaError) -> Self {
        HarmonixError::Playback(PlaybackError::Media(e))
    }
}

impl From<ResolveError> for HarmonixError {
    fn from(e: ResolveError) -> Self {
        HarmonixError::Other(e.to_string())
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, HarmonixError>;

/// Failure opening or decoding a media source.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// The host refused cross-origin access required for analysis
    #[error("cross-origin access denied for {0}")]
    CrossOriginDenied(String),

    /// Transport failure while fetching the source
    #[error("network error: {0}")]
    Network(String),

    /// The bytes could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// No decoder for this source
    #[error("unsupported media: {0}")]
    Unsupported(String),
}

/// Failure of a transport command.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// `play` was called with nothing loaded
    #[error("no source loaded")]
    NoSource,

    /// The current source failed to load or decode
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// A newer request overtook this one. Swallowed by the engine.
    #[error("operation superseded by a newer request")]
    Aborted,
}

/// Failure talking to a catalog endpoint.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// HTTP transport or status failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint did not answer within its deadline
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The body was not structurally valid for the catalog
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Failure talking to the generative-text service.
#[derive(thiserror::Error, Debug)]
pub enum AssistError {
    /// No API key configured or the service is switched off
    #[error("assistant unavailable")]
    Unavailable,

    /// HTTP transport or status failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The reply did not match the requested shape
    #[error("malformed reply: {0}")]
    Malformed(String),
}
