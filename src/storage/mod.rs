//! PostgreSQL Storage Module
//!
//! Owns the persistent corpus: the `comics`, `words`, and `comic_words` tables
//! and every query the services run against them.
//!
//! ## Core Concepts
//! - **Invariant**: a comic exists iff all of its `(comic_id, word_id)` links
//!   exist. `add` writes the comic, its words, and the links inside a single
//!   transaction so readers never observe a half-ingested comic.
//! - **Deadlock retry**: concurrent `add` calls upserting overlapping word sets
//!   deadlock on the `words` table (SQLSTATE `40P01`). The transaction is
//!   retried up to 5 times with linear backoff; any other error surfaces
//!   immediately. Word lists are deduplicated and sorted first, which makes
//!   deadlocks rarer but cannot eliminate them.
//! - **Idempotence**: every insert is `ON CONFLICT`-guarded, so re-ingesting an
//!   existing comic is a no-op.

pub mod db;


pub use db::Storage;
