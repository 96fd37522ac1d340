//! Viewer country detection: IP geolocation first, then the process locale

use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::{SourceError, SourceResult};
use crate::sources::HttpFetcher;

/// Geolocation replies are small; anything bigger is not what we asked for
const MAX_RESPONSE_BYTES: usize = 64 * 1024;
const LOCALE_VARS: &[&str] = &["LC_ALL", "LC_MESSAGES", "LANG"];

#[derive(Debug, Deserialize)]
struct GeolocationResponse {
    #[serde(default)]
    country_code: Option<String>,
}

pub struct CountryDetector {
    fetcher: Arc<dyn HttpFetcher>,
    geolocation_url: String,
}

impl CountryDetector {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, geolocation_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            geolocation_url: geolocation_url.into(),
        }
    }

    /// Uppercase country code, or `None` when neither source knows
    pub async fn detect(&self) -> Option<String> {
        match self.from_geolocation().await {
            Ok(Some(code)) => return Some(code),
            Ok(None) => debug!("Geolocation reply had no country code"),
            Err(e) => warn!("Geolocation lookup failed: {}", e),
        }

        let from_locale = LOCALE_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .and_then(|value| country_from_locale(&value));
        debug!("Locale country: {:?}", from_locale);
        from_locale
    }

    async fn from_geolocation(&self) -> SourceResult<Option<String>> {
        let response = self
            .fetcher
            .get(&self.geolocation_url, &[("Accept", "application/json")])
            .await?
            .error_for_status(&self.geolocation_url)?;

        let mut body = response.body;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| SourceError::http(0, e.to_string()))?;
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_RESPONSE_BYTES {
                return Err(SourceError::invalid_format("geolocation reply too large"));
            }
        }

        let reply: GeolocationResponse = serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::parse_error("geolocation", e.to_string()))?;
        Ok(reply.country_code.as_deref().and_then(normalize_code))
    }
}

fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    (code.len() >= 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| code.to_ascii_uppercase())
}

/// Region part of a POSIX locale string: `en_IN.UTF-8` gives `IN`
pub fn country_from_locale(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next()?;
    let region = base.split(['_', '-']).nth(1)?;
    normalize_code(region)
}
