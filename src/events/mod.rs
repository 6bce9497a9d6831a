//! Invalidation Bus Module
//!
//! The publish/subscribe contract that binds ingestion to index rebuilds.
//! After a crawl (or a drop) commits, the update side publishes on the
//! `xkcd.db.updated` subject; the search side rebuilds its index on every
//! message it receives.
//!
//! Delivery is a best-effort hint: the rebuild is idempotent and the ttl-driven
//! indexer is the authoritative freshness bound, so a lost or duplicated
//! message never breaks correctness. Per subject, messages from a single
//! publisher arrive in order.
//!
//! The bus is carried in-process over broadcast channels (the system is a
//! single binary); the subject-keyed registry keeps the publisher and the
//! subscriber decoupled from each other exactly as a broker would.

pub mod bus;


pub use bus::{run_db_updated_subscriber, BusPublisher, EventBus, SUBJECT_DB_UPDATED};
