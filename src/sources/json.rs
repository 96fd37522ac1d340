//! Streaming parser for JSON channel arrays
//!
//! The body is split into top-level array elements without materializing
//! the whole document; each element is then decoded on its own, so one
//! malformed entry never aborts the rest.

use futures::StreamExt;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, trace};

use super::batch::{ChannelBatcher, ChannelSink, ParseSummary};
use super::http::ByteStream;
use crate::errors::{AppResult, SourceError, SourceResult};
use crate::models::Channel;

const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    BeforeArray,
    BetweenElements,
    InElement,
    Done,
}

/// Incremental splitter for a top-level JSON array
///
/// Tracks string/escape state and nesting depth only; it does not validate
/// the elements it yields.
#[derive(Debug)]
pub struct JsonArraySplitter {
    state: SplitState,
    depth: usize,
    in_string: bool,
    escaped: bool,
    current: Vec<u8>,
}

impl Default for JsonArraySplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonArraySplitter {
    pub fn new() -> Self {
        Self {
            state: SplitState::BeforeArray,
            depth: 0,
            in_string: false,
            escaped: false,
            current: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == SplitState::Done
    }

    /// Consume a chunk, appending every completed element's bytes to `out`
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<Vec<u8>>) -> SourceResult<()> {
        for &byte in chunk {
            match self.state {
                SplitState::BeforeArray => match byte {
                    b'[' => self.state = SplitState::BetweenElements,
                    // UTF-8 byte order mark
                    0xEF | 0xBB | 0xBF => {}
                    b if b.is_ascii_whitespace() => {}
                    _ => {
                        return Err(SourceError::invalid_format(
                            "expected a top-level JSON array",
                        ))
                    }
                },
                SplitState::BetweenElements => match byte {
                    b']' => self.state = SplitState::Done,
                    b',' => {}
                    b if b.is_ascii_whitespace() => {}
                    _ => {
                        self.state = SplitState::InElement;
                        self.element_byte(byte, out);
                    }
                },
                SplitState::InElement => self.element_byte(byte, out),
                SplitState::Done => break,
            }
        }
        Ok(())
    }

    fn element_byte(&mut self, byte: u8, out: &mut Vec<Vec<u8>>) {
        if self.in_string {
            self.current.push(byte);
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return;
        }

        match byte {
            b'"' => {
                self.in_string = true;
                self.current.push(byte);
            }
            b'{' | b'[' => {
                self.depth += 1;
                self.current.push(byte);
            }
            b'}' | b']' if self.depth > 0 => {
                self.depth -= 1;
                self.current.push(byte);
                if self.depth == 0 {
                    self.complete(out, SplitState::BetweenElements);
                }
            }
            // A scalar element ends at the array's own delimiters
            b']' => self.complete(out, SplitState::Done),
            b',' if self.depth == 0 => self.complete(out, SplitState::BetweenElements),
            _ => self.current.push(byte),
        }
    }

    fn complete(&mut self, out: &mut Vec<Vec<u8>>, next: SplitState) {
        let element = std::mem::take(&mut self.current);
        if element.iter().any(|b| !b.is_ascii_whitespace()) {
            out.push(element);
        }
        self.state = next;
    }

    /// Check the array was closed once the input is exhausted
    pub fn finish(&self) -> SourceResult<()> {
        match self.state {
            SplitState::Done => Ok(()),
            SplitState::BeforeArray => Err(SourceError::invalid_format("empty JSON body")),
            _ => Err(SourceError::parse_error("json", "unterminated JSON array")),
        }
    }
}

/// A field value that decodes whatever the source put there
///
/// Only strings and numbers are usable; null, booleans, objects and arrays
/// read as absent.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LenientValue {
    Text(String),
    Number(serde_json::Number),
    Absent(IgnoredAny),
}

impl LenientValue {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(number) => Some(number.to_string()),
            Self::Absent(_) => None,
        }
    }
}

/// The recognised fields of one element
///
/// Other keys are skipped. A repeated key keeps its last usable value, and
/// values that read as absent never clear an earlier one.
#[derive(Debug, Default)]
struct RawChannel {
    name: Option<String>,
    url: Option<String>,
    logo: Option<String>,
    category: Option<String>,
    country: Option<String>,
}

impl<'de> Deserialize<'de> for RawChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawChannelVisitor;

        impl<'de> Visitor<'de> for RawChannelVisitor {
            type Value = RawChannel;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a channel object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawChannel, A::Error> {
                let mut raw = RawChannel::default();
                while let Some(key) = map.next_key::<String>()? {
                    let slot = match key.as_str() {
                        "name" => &mut raw.name,
                        "url" => &mut raw.url,
                        "logo" => &mut raw.logo,
                        "category" => &mut raw.category,
                        "country" => &mut raw.country,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                            continue;
                        }
                    };
                    if let Some(text) = map.next_value::<LenientValue>()?.into_text() {
                        *slot = Some(text);
                    }
                }
                Ok(raw)
            }
        }

        deserializer.deserialize_map(RawChannelVisitor)
    }
}

/// Decode one element; `None` when it is malformed or lacks a name or URL
///
/// Categories from JSON sources are kept as given.
pub fn decode_element(playlist_id: i64, element: &[u8]) -> Option<Channel> {
    let raw: RawChannel = match serde_json::from_slice(element) {
        Ok(raw) => raw,
        Err(e) => {
            trace!("Skipping malformed JSON element: {}", e);
            return None;
        }
    };

    let name = raw.name?;
    let url = raw.url?;
    let category = raw
        .category
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    // Sources without a country code often put the region in the category
    let country = raw
        .country
        .or_else(|| (category != DEFAULT_CATEGORY).then(|| category.clone()))
        .map(|c| c.to_uppercase());

    Some(Channel::parsed(
        playlist_id,
        url,
        name,
        raw.logo,
        category,
        country,
    ))
}

pub struct JsonParser;

impl JsonParser {
    /// Parse a network body holding a JSON array of channel objects
    pub async fn parse_stream<S>(
        playlist_id: i64,
        mut body: ByteStream,
        sink: &mut S,
        batch_size: usize,
    ) -> AppResult<ParseSummary>
    where
        S: ChannelSink + ?Sized,
    {
        let mut splitter = JsonArraySplitter::new();
        let mut batcher = ChannelBatcher::new(sink, batch_size);
        let mut elements = Vec::new();
        let mut skipped = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            splitter.feed(&chunk, &mut elements)?;
            for element in elements.drain(..) {
                match decode_element(playlist_id, &element) {
                    Some(channel) => batcher.push(channel).await?,
                    None => skipped += 1,
                }
            }
            if splitter.is_done() {
                break;
            }
        }
        splitter.finish()?;

        let summary = batcher.finish().await?;
        debug!(
            "Parsed {} channels in {} batches for playlist {} ({} elements skipped)",
            summary.channels, summary.batches, playlist_id, skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::batch::{CollectingSink, DEFAULT_BATCH_SIZE};
    use crate::sources::http::HttpResponse;
    use bytes::Bytes;

    async fn parse_chunks(chunks: Vec<&str>) -> AppResult<Vec<Channel>> {
        let response = HttpResponse::from_chunks(
            200,
            chunks.into_iter().map(|c| Bytes::from(c.to_string())).collect(),
        );
        let mut sink = CollectingSink::default();
        JsonParser::parse_stream(3, response.body, &mut sink, DEFAULT_BATCH_SIZE).await?;
        Ok(sink.channels().into_iter().cloned().collect())
    }

    async fn parse(content: &str) -> Vec<Channel> {
        parse_chunks(vec![content]).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_name_is_dropped() {
        let channels = parse(r#"[{"name":"A","url":"u1"},{"url":"u2"}]"#).await;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "A");
        assert_eq!(channels[0].stream_url, "u1");
        assert_eq!(channels[0].category, "Other");
        assert_eq!(channels[0].country, None);
    }

    #[tokio::test]
    async fn test_malformed_elements_are_skipped() {
        let channels = parse(concat!(
            r#"[{"name":"A","url":"u1"},"#,
            r#"42,"#,
            r#"{"name":"B","url":"u2","extra":{"nested":[1,2,{"x":"]"}]}},"#,
            r#"{"name":null,"url":"u3"},"#,
            r#"{"name":"C","url":"u4"}]"#,
        ))
        .await;
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_country_object_is_absent_and_category_fallback() {
        let channels = parse(concat!(
            r#"[{"name":"A","url":"u1","category":"in","country":{"code":"IN"}},"#,
            r#"{"name":"B","url":"u2","category":"Other","country":null},"#,
            r#"{"name":"C","url":"u3","category":"News","country":"us"}]"#,
        ))
        .await;
        assert_eq!(channels[0].country.as_deref(), Some("IN"));
        assert_eq!(channels[0].category, "in");
        assert_eq!(channels[1].country, None);
        assert_eq!(channels[2].country.as_deref(), Some("US"));
    }

    #[tokio::test]
    async fn test_categories_are_not_remapped() {
        let channels = parse(r#"[{"name":"A","url":"u1","category":"Sports News"}]"#).await;
        assert_eq!(channels[0].category, "Sports News");
    }

    #[tokio::test]
    async fn test_strings_with_brackets_and_escapes() {
        let channels = parse(
            r#" [ {"name":"Quote \" and ] bracket, comma","url":"http://x/\\path","logo":"l"} ] "#,
        )
        .await;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Quote \" and ] bracket, comma");
        assert_eq!(channels[0].stream_url, "http://x/\\path");
        assert_eq!(channels[0].logo_url.as_deref(), Some("l"));
    }

    #[tokio::test]
    async fn test_elements_split_across_chunks() {
        let channels = parse_chunks(vec![
            "\u{feff}[{\"name\":\"A\",\"u",
            "rl\":\"u1\"},{\"name\":\"B\\",
            "\"\",\"url\":\"u2\"}",
            "]",
        ])
        .await
        .unwrap();
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B\""]);
    }

    #[tokio::test]
    async fn test_non_array_body_fails() {
        let err = parse_chunks(vec![r#"{"channels":[]}"#]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::errors::AppError::Source(SourceError::InvalidFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_array_fails_without_final_flush() {
        let response = HttpResponse::from_bytes(200, r#"[{"name":"A","url":"u1"},{"name":"#);
        let mut sink = CollectingSink::default();
        let result = JsonParser::parse_stream(1, response.body, &mut sink, DEFAULT_BATCH_SIZE).await;
        assert!(result.is_err());
        assert!(sink.batches.is_empty());
    }

    #[test]
    fn test_empty_name_is_kept() {
        let channel = decode_element(1, br#"{"name":"","url":"u1"}"#).unwrap();
        assert_eq!(channel.name, "");
        assert_eq!(channel.stream_url, "u1");

        let channel = decode_element(1, br#"{"name":"A","url":""}"#).unwrap();
        assert_eq!(channel.stream_url, "");
    }

    #[test]
    fn test_repeated_keys_keep_last_value() {
        let channel = decode_element(1, br#"{"name":"Old","name":"New","url":"u1"}"#).unwrap();
        assert_eq!(channel.name, "New");

        // A later null or object does not erase an earlier value
        let channel = decode_element(
            1,
            br#"{"name":"A","url":"u1","country":"in","country":null,"logo":"l","logo":{}}"#,
        )
        .unwrap();
        assert_eq!(channel.country.as_deref(), Some("IN"));
        assert_eq!(channel.logo_url.as_deref(), Some("l"));
    }

    #[test]
    fn test_non_object_element_is_rejected() {
        assert!(decode_element(1, b"42").is_none());
        assert!(decode_element(1, br#"["name","url"]"#).is_none());
        assert!(decode_element(1, br#"{"name":"A","url":"u1""#).is_none());
    }

    #[tokio::test]
    async fn test_numbers_read_as_text() {
        let channels = parse(r#"[{"name":123,"url":"u1","country":true}]"#).await;
        assert_eq!(channels[0].name, "123");
        assert_eq!(channels[0].country, None);
    }

    #[test]
    fn test_splitter_empty_array() {
        let mut splitter = JsonArraySplitter::new();
        let mut out = Vec::new();
        splitter.feed(b"  [ ]  ", &mut out).unwrap();
        assert!(out.is_empty());
        assert!(splitter.finish().is_ok());
    }
}
