//! URL helpers used by the sources and for log output

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Marker URL for the playlist bundled with the binary
pub const INTERNAL_SAMPLE_URL: &str = "internal://debug";

/// Hide credentials embedded in a URL before it reaches a log line
///
/// Handles both `user:pass@host` authority credentials and common
/// credential query parameters (`username=`, `password=`, ...).
pub fn obfuscate_credentials(url: &str) -> String {
    static PARAMS: OnceLock<Regex> = OnceLock::new();

    let mut obfuscated = url.to_string();

    if let Ok(parsed) = Url::parse(url) {
        if !parsed.username().is_empty() || parsed.password().is_some() {
            let mut new_url = parsed.clone();
            let _ = new_url.set_username("****");
            let _ = new_url.set_password(Some("****"));
            obfuscated = new_url.to_string();
        }
    }

    let params = PARAMS.get_or_init(|| {
        Regex::new(r"(?i)([?&](?:username|password|user|pass|pwd|passwd)=)[^&]*")
            .expect("credential parameter pattern is valid")
    });
    params.replace_all(&obfuscated, "${1}****").to_string()
}

/// True when the URL names the bundled sample playlist
pub fn is_internal_sample(url: &str) -> bool {
    url.trim() == INTERNAL_SAMPLE_URL
}

/// True when the URL path ends in `.json` (case-insensitive, query ignored)
pub fn is_json_source(url: &str) -> bool {
    let trimmed = url.trim();
    let path = match Url::parse(trimmed) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    path.to_ascii_lowercase().ends_with(".json")
}
