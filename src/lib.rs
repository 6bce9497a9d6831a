//! XKCD Search Engine Library
//!
//! This library crate defines the core modules that make up the search system.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of six cooperating subsystems:
//!
//! - **`update`**: The ingestion engine. Reconciles the local corpus against the
//!   remote last-known id, fetches missing comics concurrently through a bounded
//!   worker pool, normalizes their text, and persists them.
//! - **`search`**: The ranking engine. Scores comics against a normalized query
//!   phrase, either by scanning the database or by consulting an in-memory
//!   inverted index that is rebuilt wholesale and swapped atomically.
//! - **`words`**: The text normalizer. Turns free text into an ordered,
//!   deduplicated list of lowercase English stems.
//! - **`storage`**: The PostgreSQL adapter. Owns the comics/words/comic_words
//!   schema and the deadlock-retrying transactional write path.
//! - **`events`**: The invalidation bus. Publishes `xkcd.db.updated` after
//!   ingestion commits so the search index is rebuilt shortly after.
//! - **`api`**: The REST gateway. Authentication, admission control, and the
//!   JSON surface over the internal services.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod search;
pub mod storage;
pub mod update;
pub mod words;
