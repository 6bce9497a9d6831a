use serde::Serialize;

/// A comic as fetched from the remote archive, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct XkcdInfo {
    pub id: i64,
    pub url: String,
    pub title: String,
    /// Space-joined concatenation of the remote safe title, transcript, and
    /// alt text, blank fields omitted.
    pub description: String,
}

/// A comic ready for persistence: fetched, normalized, and stemmed.
#[derive(Debug, Clone)]
pub struct NewComic {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub words: Vec<String>,
}

/// Raw table counts reported by storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbStats {
    pub words_total: i64,
    pub words_unique: i64,
    pub comics_fetched: i64,
}

/// Database counts plus the size of the remote corpus.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStats {
    pub words_total: i64,
    pub words_unique: i64,
    pub comics_fetched: i64,
    pub comics_total: i64,
}

/// Crawl state as seen by callers. `Unknown` never originates here; it exists
/// so transports have a rendering for values they cannot interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Idle,
    Running,
    Unknown,
}
