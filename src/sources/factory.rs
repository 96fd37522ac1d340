//! Parser selection by playlist URL shape

use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{ChannelSink, ParseSummary};
use super::http::HttpFetcher;
use super::json::JsonParser;
use super::m3u::M3uParser;
use super::sample::SAMPLE_PLAYLIST;
use crate::errors::AppResult;
use crate::models::Playlist;
use crate::utils::url::{is_internal_sample, is_json_source, obfuscate_credentials};

/// Wire format of a playlist source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    /// Built-in offline M3U text
    Sample,
    Json,
    M3u,
}

impl PlaylistFormat {
    pub fn detect(url: &str) -> Self {
        if is_internal_sample(url) {
            Self::Sample
        } else if is_json_source(url) {
            Self::Json
        } else {
            Self::M3u
        }
    }
}

/// Fetches a playlist and streams its channels into a sink
#[derive(Clone)]
pub struct PlaylistReader {
    fetcher: Arc<dyn HttpFetcher>,
    batch_size: usize,
}

impl PlaylistReader {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, batch_size: usize) -> Self {
        Self {
            fetcher,
            batch_size,
        }
    }

    pub fn fetcher(&self) -> Arc<dyn HttpFetcher> {
        self.fetcher.clone()
    }

    /// Parse `playlist` into `sink`
    ///
    /// Transport failures and non-2xx responses are returned as errors;
    /// batches accepted before the failure stay with the sink.
    pub async fn read_into<S>(&self, playlist: &Playlist, sink: &mut S) -> AppResult<ParseSummary>
    where
        S: ChannelSink + ?Sized,
    {
        let format = PlaylistFormat::detect(&playlist.url);
        let display_url = obfuscate_credentials(&playlist.url);
        debug!("Reading playlist '{}' as {:?} from {}", playlist.name, format, display_url);

        let summary = match format {
            PlaylistFormat::Sample => {
                M3uParser::parse_str(playlist.id, SAMPLE_PLAYLIST, sink, self.batch_size).await?
            }
            PlaylistFormat::Json => {
                let response = self
                    .fetcher
                    .get(&playlist.url, &[])
                    .await?
                    .error_for_status(&playlist.url)?;
                JsonParser::parse_stream(playlist.id, response.body, sink, self.batch_size).await?
            }
            PlaylistFormat::M3u => {
                let response = self
                    .fetcher
                    .get(&playlist.url, &[])
                    .await?
                    .error_for_status(&playlist.url)?;
                M3uParser::parse_stream(playlist.id, response.body, sink, self.batch_size).await?
            }
        };

        info!(
            "Read {} channels from playlist '{}' ({} batches)",
            summary.channels, playlist.name, summary.batches
        );
        Ok(summary)
    }
}
