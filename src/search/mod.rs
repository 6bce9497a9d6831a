//! Search Service Module
//!
//! The core component responsible for executing user queries against the
//! corpus.
//!
//! ## Overview
//! Two query paths share one scoring function: a baseline that scans every
//! comic straight out of the database, and an indexed path that consults an
//! in-memory inverted index (`stem -> comic ids` plus `id -> comic`). The
//! index is never patched incrementally; it is rebuilt wholesale from the
//! database and swapped in under a writer lock, so readers always observe a
//! complete snapshot.
//!
//! ## Ranking
//! For each candidate comic: `matches` is the number of its words found in the
//! query stem set, `ratio` is `matches` over its word count. Results order by
//! matches descending, then ratio descending, then id ascending, truncated to
//! the caller's limit.
//!
//! ## Submodules
//! - **`service`**: validation, both query paths, and the rebuild/swap.
//! - **`indexer`**: the rebuild triggers (startup and the ttl ticker).
//! - **`types`**: the comic projection used by ranking.

pub mod indexer;
pub mod service;
pub mod types;


pub use service::SearchService;
