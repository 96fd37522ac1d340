//! Playlist sources: fetching and streaming parsers
//!
//! Both parsers share one contract: channels are handed to a
//! [`ChannelSink`] in batches of at most `batch_size`, with a final flush of
//! the remainder. A transport or top-level format failure aborts the parse
//! and is returned to the caller; batches already accepted stay accepted.

pub mod batch;
pub mod factory;
pub mod http;
pub mod json;
pub mod m3u;
pub mod sample;

pub use batch::{ChannelBatcher, ChannelSink, CollectingSink, ParseSummary, DEFAULT_BATCH_SIZE};
pub use factory::{PlaylistFormat, PlaylistReader};
pub use http::{ByteStream, HttpFetcher, HttpResponse, ReqwestFetcher};
pub use json::JsonParser;
pub use m3u::M3uParser;
