use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use crate::error::{Error, Result};
use crate::search::SearchService;
use crate::update::service::EventPublisher;

/// Subject on which ingestion signals that the corpus changed.
pub const SUBJECT_DB_UPDATED: &str = "xkcd.db.updated";

/// Buffered messages per subject before slow subscribers start lagging.
const SUBJECT_CAPACITY: usize = 16;

/// Subject-keyed registry of broadcast channels.
///
/// Publishing to a subject nobody listens on succeeds, like on any broker;
/// subscribers that fall behind get a lag notification instead of blocking
/// the publisher.
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
        })
    }

    fn channel(&self, subject: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(SUBJECT_CAPACITY).0)
            .clone()
    }

    /// Publish a payload on a subject. Empty payloads are refused; a missing
    /// audience is not an error.
    pub fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::internal("refusing to publish empty payload"));
        }

        // send only fails when there are no receivers
        let _ = self.channel(subject).send(payload.to_vec());
        Ok(())
    }

    pub fn subscribe(&self, subject: &str) -> broadcast::Receiver<Vec<u8>> {
        self.channel(subject).subscribe()
    }
}

/// The `EventPublisher` port of the ingestion engine, bound to the
/// `xkcd.db.updated` subject.
pub struct BusPublisher {
    bus: Arc<EventBus>,
}

impl BusPublisher {
    pub fn new(bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self { bus })
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn notify_db_changed(&self) -> Result<()> {
        self.bus
            .publish(SUBJECT_DB_UPDATED, b"XKCD DB has been updated")
    }
}

/// Subscriber loop installed at startup: rebuild the search index on every
/// `db.updated` message. Rebuild failures are logged; a lagged receiver still
/// triggers a rebuild, which covers whatever messages were dropped. Returns
/// (unsubscribing) when the shutdown signal fires.
pub async fn run_db_updated_subscriber(
    bus: Arc<EventBus>,
    search: Arc<SearchService>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rx = bus.subscribe(SUBJECT_DB_UPDATED);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stopping db.updated subscriber");
                return;
            }
            msg = rx.recv() => {
                match msg {
                    Ok(_) => {
                        tracing::info!("received db update event");
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("db.updated subscriber lagged by {} messages", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("db.updated channel closed, stopping subscriber");
                        return;
                    }
                }

                if let Err(err) = search.rebuild_index().await {
                    tracing::error!("failed to rebuild index on event: {}", err);
                }
            }
        }
    }
}
