pub mod country;
pub mod fallback;
pub mod session;

pub use country::CountryDetector;
pub use fallback::{sanitize_channel_name, FallbackDecision, FallbackResolver};
pub use session::{BrowserFilters, BrowserSession, BrowserView, PlaybackEvent, PlaybackSignal};
