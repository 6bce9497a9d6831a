//! Text Normalization Module
//!
//! Turns free text into the canonical stem list used everywhere else in the
//! system: by ingestion when persisting a comic's words and by search when
//! interpreting a query phrase. Both sides going through the same pipeline is
//! what makes the word-overlap scoring meaningful.
//!
//! ## Pipeline
//! 1. **Tokenize**: extract `[A-Za-z0-9]+` runs after NFKC normalization.
//! 2. **Lowercase**: stop-word and stemming tables are lowercase-only.
//! 3. **Filter**: drop English stop-words; all-digit tokens pass through as-is.
//! 4. **Stem**: Snowball English stemming.
//! 5. **Dedupe**: keep the first occurrence of each stem, preserving order.
//!
//! ## Submodules
//! - **`normalizer`**: the pure normalization function.
//! - **`service`**: the `Normalizer` port with the input size limit enforced.

pub mod normalizer;
pub mod service;


pub use service::{Normalizer, WordsService};
