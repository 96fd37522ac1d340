//! Alternative-stream lookup after a playback failure

use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::models::Channel;
use crate::repositories::ChannelStore;

fn parenthetical_regex() -> &'static Regex {
    static PARENTHETICAL: OnceLock<Regex> = OnceLock::new();
    PARENTHETICAL.get_or_init(|| Regex::new(r"\(.*?\)").expect("parenthetical pattern is valid"))
}

fn quality_tag_regex() -> &'static Regex {
    static QUALITY: OnceLock<Regex> = OnceLock::new();
    QUALITY.get_or_init(|| {
        Regex::new(r"(?i)\b(?:HD|FHD|4K|HEVC)\b").expect("quality tag pattern is valid")
    })
}

/// Strip source and quality decorations from a channel name
///
/// `"Sony SAB HD (Source 1)"` becomes `"Sony SAB"`. Runs of whitespace left
/// behind, including inside the name, collapse to one space.
pub fn sanitize_channel_name(name: &str) -> String {
    let without_notes = parenthetical_regex().replace_all(name, "");
    let without_tags = quality_tag_regex().replace_all(&without_notes, "");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What playback should do after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Switch to this alternative; more may remain queued
    Retry(Channel),
    /// No alternatives left for this selection
    Exhausted,
}

/// Offers alternatives for a failed channel one at a time
///
/// The queue is filled on the first failure after a selection and drained
/// by later failures. [`FallbackResolver::reset`] starts a new selection.
pub struct FallbackResolver {
    channels: Arc<dyn ChannelStore>,
    queue: Option<VecDeque<Channel>>,
}

impl FallbackResolver {
    pub fn new(channels: Arc<dyn ChannelStore>) -> Self {
        Self {
            channels,
            queue: None,
        }
    }

    /// Forget the current queue; called when the user picks a channel
    pub fn reset(&mut self) {
        self.queue = None;
    }

    /// Alternatives still queued, if a queue exists
    pub fn pending(&self) -> Option<usize> {
        self.queue.as_ref().map(VecDeque::len)
    }

    pub async fn on_failure(&mut self, channel_name: &str, stream_url: &str) -> FallbackDecision {
        if self.queue.is_none() {
            let query = sanitize_channel_name(channel_name);
            let alternatives = if query.is_empty() {
                debug!("Nothing left of '{}' to search for", channel_name);
                Vec::new()
            } else {
                match self.channels.find_alternatives(&query, stream_url).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("Alternative lookup for '{}' failed: {}", query, e);
                        Vec::new()
                    }
                }
            };
            info!(
                "Found {} alternatives for '{}' (searched '{}')",
                alternatives.len(),
                channel_name,
                query
            );
            self.queue = Some(alternatives.into());
        }

        match self.queue.as_mut().and_then(VecDeque::pop_front) {
            Some(next) => {
                info!("Falling back to '{}'", next.name);
                FallbackDecision::Retry(next)
            }
            None => {
                info!("No alternatives left for '{}'", channel_name);
                FallbackDecision::Exhausted
            }
        }
    }
}
