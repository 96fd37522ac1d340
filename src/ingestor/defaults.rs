//! Playlists seeded on first start

use crate::config::FAST_PLAYLIST_URL;
use crate::models::NewPlaylist;
use crate::utils::url::INTERNAL_SAMPLE_URL;

const DEFAULT_PLAYLIST_URLS: &[&str] = &[
    FAST_PLAYLIST_URL,
    "https://iptv-org.github.io/iptv/index.country.m3u",
    "https://iptv-org.github.io/iptv/index.language.m3u",
    INTERNAL_SAMPLE_URL,
];

fn display_name(index: usize, url: &str) -> String {
    if url.contains("channels.json") {
        "IPTV-ORG (JSON - Fast)".to_string()
    } else if url.contains("index.country") {
        "IPTV-ORG (Country)".to_string()
    } else if url.contains("index.language") {
        "IPTV-ORG (Language)".to_string()
    } else if url == INTERNAL_SAMPLE_URL {
        "Built-in Samples".to_string()
    } else {
        format!("Playlist {}", index + 1)
    }
}

/// The default playlist list, in display order
pub fn default_playlists() -> Vec<NewPlaylist> {
    DEFAULT_PLAYLIST_URLS
        .iter()
        .enumerate()
        .map(|(index, url)| NewPlaylist {
            name: display_name(index, url),
            url: url.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let names: Vec<_> = default_playlists().into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "IPTV-ORG (JSON - Fast)",
                "IPTV-ORG (Country)",
                "IPTV-ORG (Language)",
                "Built-in Samples",
            ]
        );
    }

    #[test]
    fn test_unknown_url_gets_positional_name() {
        assert_eq!(display_name(4, "http://elsewhere/list.m3u"), "Playlist 5");
    }
}
