use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub mod category;

pub use category::Category;

/// One playable stream entry
///
/// `stream_url` is the store-wide primary key; a later record with the same
/// URL replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub stream_url: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub category: String,
    pub country: Option<String>,
    pub last_watched: Option<DateTime<Utc>>,
    pub is_favorite: bool,
    pub playlist_id: i64,
}

impl Channel {
    /// A freshly parsed channel: never watched, not a favorite
    pub fn parsed(
        playlist_id: i64,
        stream_url: impl Into<String>,
        name: impl Into<String>,
        logo_url: Option<String>,
        category: impl Into<String>,
        country: Option<String>,
    ) -> Self {
        Self {
            stream_url: stream_url.into(),
            name: name.into(),
            logo_url,
            category: category.into(),
            country,
            last_watched: None,
            is_favorite: false,
            playlist_id,
        }
    }
}

/// One playlist source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub is_selected: bool,
}

/// Playlist row before the store has assigned an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub url: String,
}

/// Reserved category label selecting favorites instead of a category
pub const FAVORITES_CATEGORY: &str = "Favorites";

/// Category constraint of a channel page query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Favorites,
    Named(String),
}

impl CategoryFilter {
    /// Map the UI's optional category value, honouring the reserved "Favorites" label
    pub fn from_selection(selection: Option<&str>) -> Self {
        match selection {
            None => Self::All,
            Some(FAVORITES_CATEGORY) => Self::Favorites,
            Some(name) => Self::Named(name.to_string()),
        }
    }
}

/// Filtered, paged channel query scoped to one playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPageQuery {
    pub playlist_id: i64,
    pub category: CategoryFilter,
    pub country: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

/// Stored country filter preference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CountryPreference {
    Explicit(String),
    All,
    #[default]
    UseDetected,
}

impl CountryPreference {
    const ALL: &'static str = "ALL";
    const DETECTED: &'static str = "DETECTED";

    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None | Some(Self::DETECTED) => Self::UseDetected,
            Some(Self::ALL) => Self::All,
            Some(code) => Self::Explicit(code.to_uppercase()),
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            Self::Explicit(code) => code.clone(),
            Self::All => Self::ALL.to_string(),
            Self::UseDetected => Self::DETECTED.to_string(),
        }
    }

    /// The country filter to apply given what detection found
    pub fn effective(&self, detected: Option<&str>) -> Option<String> {
        match self {
            Self::Explicit(code) => Some(code.clone()),
            Self::All => None,
            Self::UseDetected => detected.map(|c| c.to_string()),
        }
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
