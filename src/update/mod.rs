//! Ingestion Engine Module
//!
//! Reconciles the local corpus against the remote xkcd archive and fills the
//! gaps.
//!
//! ## Architecture Workflow
//! 1. **Reconcile**: ask the remote for its last comic id, ask the database
//!    which ids are already stored, and diff the two (id 404 is a documented
//!    hole in the archive and is never requested).
//! 2. **Fetch**: a fixed pool of workers drains a bounded channel of missing
//!    ids. A failure on one id is logged and never aborts the crawl; partial
//!    progress is the contract.
//! 3. **Normalize & Persist**: each comic's title and description are stemmed
//!    and the comic is written through the transactional storage path.
//! 4. **Signal**: once the pool drains, a `db.updated` event tells the search
//!    side to rebuild its index.
//!
//! Only one update runs at a time: the run flag is taken with a compare-and-set
//! and callers that lose the race get an immediate `AlreadyExists` rather than
//! queueing behind the crawl.
//!
//! ## Submodules
//! - **`service`**: the engine itself plus the ports it consumes.
//! - **`xkcd`**: the HTTP client for the remote archive.
//! - **`types`**: comic, stats, and status records.

pub mod service;
pub mod types;
pub mod xkcd;

#[cfg(test)]
mod tests;

pub use service::UpdateService;
pub use xkcd::XkcdClient;
