//! Canonical channel categories and group-label normalization

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// Canonical category labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    News,
    Sports,
    Movies,
    Kids,
    Music,
    Documentary,
    Entertainment,
    Other,
}

/// Keyword sets in match priority order; the first containing keyword wins.
const KEYWORDS: &[(Category, &[&str])] = &[
    (Category::News, &["news"]),
    (Category::Sports, &["sport"]),
    (Category::Movies, &["movie", "cinema", "film"]),
    (Category::Kids, &["kid", "child", "cartoon"]),
    (Category::Music, &["music"]),
    (Category::Documentary, &["doc"]),
    (Category::Entertainment, &["entertain"]),
];

/// Display order for category pickers
const DISPLAY_PRIORITY: &[Category] = &[
    Category::News,
    Category::Sports,
    Category::Movies,
    Category::Kids,
    Category::Entertainment,
    Category::Music,
    Category::Documentary,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "News",
            Category::Sports => "Sports",
            Category::Movies => "Movies",
            Category::Kids => "Kids",
            Category::Music => "Music",
            Category::Documentary => "Documentary",
            Category::Entertainment => "Entertainment",
            Category::Other => "Other",
        }
    }

    /// Classify a free-text group label
    ///
    /// Returns `None` when no keyword matches and the label is neither empty
    /// nor "uncategorized"; callers then keep the label verbatim.
    pub fn classify(label: &str) -> Option<Category> {
        let lower = label.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(category, _)| *category)
            .or_else(|| (lower.is_empty() || lower == "uncategorized").then_some(Category::Other))
    }

    /// Map a group label to its canonical category, or pass it through unchanged
    ///
    /// Unmatched labels are kept exactly as given, including case, so
    /// differently spelled labels stay distinct categories.
    pub fn normalize(label: &str) -> Cow<'_, str> {
        match Self::classify(label) {
            Some(category) => Cow::Borrowed(category.as_str()),
            None => Cow::Borrowed(label),
        }
    }

    /// Sort category labels with canonical ones first (fixed order), then the rest lexically
    pub fn priority_sort(labels: &mut [String]) {
        fn rank(label: &str) -> usize {
            DISPLAY_PRIORITY
                .iter()
                .position(|c| c.as_str() == label)
                .unwrap_or(DISPLAY_PRIORITY.len())
        }

        labels.sort_by(|a, b| match rank(a).cmp(&rank(b)) {
            Ordering::Equal => a.cmp(b),
            other => other,
        });
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
