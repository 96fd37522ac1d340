//! Extended-M3U stream parser
//!
//! The parser is a line-fed state machine. Network bodies and in-memory
//! strings both go through [`M3uParser::parse_reader`], so the two input
//! paths cannot drift apart.
//!
//! ```text
//! #EXTINF:-1 tvg-logo="http://l/x.png" group-title="News" tvg-country="in",Some Channel
//! http://host/stream.m3u8
//! ```

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::batch::{ChannelBatcher, ChannelSink, ParseSummary};
use super::http::ByteStream;
use crate::errors::AppResult;
use crate::models::{Category, Channel};

const EXTINF_PREFIX: &str = "#EXTINF:";
const UNCATEGORIZED: &str = "Uncategorized";

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).expect("attribute pattern is valid")
    })
}

/// Metadata collected from the last `#EXTINF:` line
#[derive(Debug, Default)]
struct PendingEntry {
    name: Option<String>,
    logo: Option<String>,
    group: Option<String>,
    country: Option<String>,
}

pub struct M3uParser {
    playlist_id: i64,
    pending: PendingEntry,
}

impl M3uParser {
    pub fn new(playlist_id: i64) -> Self {
        Self {
            playlist_id,
            pending: PendingEntry::default(),
        }
    }

    /// Feed one line; returns a channel when the line completes an entry
    pub fn feed_line(&mut self, line: &str) -> Option<Channel> {
        let line = line.trim();

        if let Some(info) = line.strip_prefix(EXTINF_PREFIX) {
            self.read_extinf(info);
            return None;
        }
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        // URL lines without metadata are dropped
        let pending = std::mem::take(&mut self.pending);
        let name = pending.name?;
        let group = pending.group.as_deref().unwrap_or(UNCATEGORIZED);

        Some(Channel::parsed(
            self.playlist_id,
            line,
            name,
            pending.logo,
            Category::normalize(group).into_owned(),
            pending.country.map(|c| c.to_uppercase()),
        ))
    }

    fn read_extinf(&mut self, info: &str) {
        // The title follows the last comma; lines without one carry nothing usable
        let Some(comma) = info.rfind(',') else {
            return;
        };
        let (attributes, title) = info.split_at(comma);

        let mut found: HashMap<&str, &str> = HashMap::new();
        for capture in attribute_regex().captures_iter(attributes) {
            if let (Some(key), Some(value)) = (capture.get(1), capture.get(2)) {
                found.entry(key.as_str()).or_insert(value.as_str());
            }
        }

        self.pending = PendingEntry {
            name: Some(title[1..].trim().to_string()),
            logo: found.get("tvg-logo").map(|v| v.to_string()),
            group: found.get("group-title").map(|v| v.to_string()),
            country: found.get("tvg-country").map(|v| v.to_string()),
        };
    }

    /// Parse line by line from any buffered reader
    ///
    /// A read error aborts the parse without flushing the partial batch.
    pub async fn parse_reader<R, S>(
        playlist_id: i64,
        mut reader: R,
        sink: &mut S,
        batch_size: usize,
    ) -> AppResult<ParseSummary>
    where
        R: AsyncBufRead + Unpin + Send,
        S: ChannelSink + ?Sized,
    {
        let mut parser = Self::new(playlist_id);
        let mut batcher = ChannelBatcher::new(sink, batch_size);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(channel) = parser.feed_line(&line) {
                batcher.push(channel).await?;
            }
        }

        let summary = batcher.finish().await?;
        debug!(
            "Parsed {} channels in {} batches for playlist {}",
            summary.channels, summary.batches, playlist_id
        );
        Ok(summary)
    }

    /// Parse a network body without buffering it whole
    pub async fn parse_stream<S>(
        playlist_id: i64,
        body: ByteStream,
        sink: &mut S,
        batch_size: usize,
    ) -> AppResult<ParseSummary>
    where
        S: ChannelSink + ?Sized,
    {
        Self::parse_reader(playlist_id, StreamReader::new(body), sink, batch_size).await
    }

    /// Parse already materialized content
    pub async fn parse_str<S>(
        playlist_id: i64,
        content: &str,
        sink: &mut S,
        batch_size: usize,
    ) -> AppResult<ParseSummary>
    where
        S: ChannelSink + ?Sized,
    {
        Self::parse_reader(playlist_id, content.as_bytes(), sink, batch_size).await
    }
}
