//! Track resolver
//!
//! `resolve(query, limit)` never fails. Tiers, in order:
//!
//! 1. primary catalog: all mirrors raced, first structurally valid reply wins
//! 2. secondary catalog, normalized into the same descriptor shape
//! 3. a single placeholder descriptor on the bundled demo track

mod entities;
mod primary;
mod race;
mod secondary;
mod transport;

pub use entities::decode_html_entities;
pub use primary::select_stream_url;
pub use race::{is_structurally_valid, race_first_valid};
pub use transport::{CatalogTransport, HttpTransport};

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::track::TrackDescriptor;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Resolves text queries into playable descriptors.
#[derive(Clone)]
pub struct TrackResolver {
    transport: Arc<dyn CatalogTransport>,
    config: ResolverConfig,
}

impl TrackResolver {
    /// Resolver over HTTP.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?), config))
    }

    /// Resolver over a custom transport.
    pub fn with_transport(transport: Arc<dyn CatalogTransport>, config: ResolverConfig) -> Self {
        Self { transport, config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Ranked descriptors for `query`.
    ///
    /// An empty (or whitespace) query yields an empty list; any other query
    /// yields at least one descriptor.
    #[instrument(skip(self), fields(mirrors = self.config.primary_mirrors.len()))]
    pub async fn resolve(&self, query: &str, limit: usize) -> Vec<TrackDescriptor> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let limit = if limit == 0 {
            self.config.default_limit
        } else {
            limit
        };

        let primary = self.search_primary(query, limit).await;
        if !primary.is_empty() {
            info!(count = primary.len(), "resolved from primary catalog");
            return primary;
        }

        let secondary = self.search_secondary(query, limit).await;
        if !secondary.is_empty() {
            info!(count = secondary.len(), "resolved from secondary catalog");
            return secondary;
        }

        warn!("all catalogs failed; using placeholder track");
        vec![TrackDescriptor::placeholder(
            query,
            &self.config.demo_track_url,
        )]
    }

    async fn search_primary(&self, query: &str, limit: usize) -> Vec<TrackDescriptor> {
        let urls: Vec<String> = self
            .config
            .primary_mirrors
            .iter()
            .filter_map(|base| primary::search_url(base, query, limit))
            .collect();
        if urls.is_empty() {
            return Vec::new();
        }

        let Some((_, body)) =
            race_first_valid(self.transport.as_ref(), &urls, self.config.mirror_timeout()).await
        else {
            debug!("no primary mirror produced a valid response");
            return Vec::new();
        };

        match primary::results(&body) {
            Some(entries) if !entries.is_empty() => entries
                .iter()
                .take(limit)
                .map(|e| primary::normalize(e, &self.config.demo_track_url))
                .collect(),
            _ => {
                debug!("primary catalog returned no results");
                Vec::new()
            }
        }
    }

    async fn search_secondary(&self, query: &str, limit: usize) -> Vec<TrackDescriptor> {
        let Some(url) = secondary::search_url(&self.config.secondary_url, query, limit) else {
            return Vec::new();
        };
        let request = self.transport.get_json(&url);
        match tokio::time::timeout(self.config.secondary_timeout(), request).await {
            Ok(Ok(body)) => secondary::normalize(body),
            Ok(Err(e)) => {
                debug!(error = %e, "secondary catalog failed");
                Vec::new()
            }
            Err(_) => {
                debug!("secondary catalog timed out");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for TrackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
