use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use super::types::{DbStats, NewComic, ServiceStats, UpdateStatus, XkcdInfo};
use crate::error::{Error, Result};
use crate::words::Normalizer;

/// Id 404 does not exist in the remote archive and is never requested.
pub const MISSING_COMIC_ID: i64 = 404;

/// Storage port of the ingestion engine.
#[async_trait]
pub trait Db: Send + Sync {
    async fn add(&self, comic: &NewComic) -> Result<()>;
    async fn ids(&self) -> Result<Vec<i64>>;
    async fn stats(&self) -> Result<DbStats>;
    async fn drop_all(&self) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

/// Remote archive port.
#[async_trait]
pub trait Xkcd: Send + Sync {
    async fn get(&self, id: i64) -> Result<XkcdInfo>;
    async fn last_id(&self) -> Result<i64>;
}

/// Invalidation bus port.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn notify_db_changed(&self) -> Result<()>;
}

pub struct UpdateService {
    db: Arc<dyn Db>,
    xkcd: Arc<dyn Xkcd>,
    words: Arc<dyn Normalizer>,
    events: Arc<dyn EventPublisher>,
    concurrency: usize,
    pub(crate) running: AtomicBool,
}

/// Releases the run flag on every exit path, including panics and futures
/// dropped mid-crawl.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl UpdateService {
    pub fn new(
        db: Arc<dyn Db>,
        xkcd: Arc<dyn Xkcd>,
        words: Arc<dyn Normalizer>,
        events: Arc<dyn EventPublisher>,
        concurrency: usize,
    ) -> Result<Arc<Self>> {
        if concurrency < 1 {
            return Err(Error::internal(format!(
                "wrong concurrency specified: {}",
                concurrency
            )));
        }

        Ok(Arc::new(Self {
            db,
            xkcd,
            words,
            events,
            concurrency,
            running: AtomicBool::new(false),
        }))
    }

    fn lock_run(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::AlreadyExists)?;
        Ok(RunGuard {
            flag: &self.running,
        })
    }

    /// Crawl the remote archive for comics missing locally.
    ///
    /// Fails fast with `AlreadyExists` if a crawl is in flight. On success with
    /// at least one fetched id, publishes `db.updated` after the worker pool
    /// drains; a publish failure is the returned error so callers know the
    /// index may lag.
    pub async fn update(&self, mut cancel: watch::Receiver<bool>) -> Result<()> {
        let _guard = self.lock_run()?;

        if *cancel.borrow_and_update() {
            return Err(Error::Canceled);
        }

        let last = self.xkcd.last_id().await?;
        let have: HashSet<i64> = self.db.ids().await?.into_iter().collect();

        let missing: Vec<i64> = (1..=last)
            .filter(|id| *id != MISSING_COMIC_ID && !have.contains(id))
            .collect();

        if missing.is_empty() {
            tracing::info!("no new comics to fetch");
            return Ok(());
        }

        tracing::info!("fetching {} missing comics", missing.len());

        let (tx, rx) = mpsc::channel::<i64>(self.concurrency * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.concurrency);
        for _ in 0..self.concurrency {
            let db = self.db.clone();
            let xkcd = self.xkcd.clone();
            let words = self.words.clone();
            let rx = rx.clone();
            workers.push(tokio::spawn(worker(db, xkcd, words, rx)));
        }

        let mut cancelled = false;
        'feed: for id in missing {
            loop {
                tokio::select! {
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            cancelled = true;
                            break 'feed;
                        }
                        // Value flipped back to false; retry the send.
                    }
                    sent = tx.send(id) => {
                        if sent.is_err() {
                            break 'feed;
                        }
                        break;
                    }
                }
            }
        }

        // Closing the channel lets workers drain in-flight jobs and exit.
        drop(tx);
        for handle in workers {
            let _ = handle.await;
        }

        if cancelled {
            return Err(Error::Canceled);
        }

        self.events.notify_db_changed().await
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        let db_stats = self.db.stats().await?;
        let last = self.xkcd.last_id().await?;

        let holes = if last >= MISSING_COMIC_ID { 1 } else { 0 };

        Ok(ServiceStats {
            words_total: db_stats.words_total,
            words_unique: db_stats.words_unique,
            comics_fetched: db_stats.comics_fetched,
            comics_total: last - holes,
        })
    }

    pub fn status(&self) -> UpdateStatus {
        if self.running.load(Ordering::SeqCst) {
            UpdateStatus::Running
        } else {
            UpdateStatus::Idle
        }
    }

    /// Truncate the corpus and signal the search side to rebuild.
    pub async fn drop_all(&self) -> Result<()> {
        self.db.drop_all().await?;
        self.events.notify_db_changed().await
    }

    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

/// One pool worker: fetch, normalize, persist, one id at a time. Failures are
/// logged and the worker moves on; the crawl succeeds partially by contract.
pub(crate) async fn worker(
    db: Arc<dyn Db>,
    xkcd: Arc<dyn Xkcd>,
    words: Arc<dyn Normalizer>,
    jobs: Arc<Mutex<mpsc::Receiver<i64>>>,
) {
    loop {
        let id = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(id) = id else {
            break;
        };

        let info = match xkcd.get(id).await {
            Ok(info) => info,
            Err(err) => {
                tracing::error!("xkcd get failed for id {}: {}", id, err);
                continue;
            }
        };

        let phrase = format!("{} {}", info.title, info.description);
        let norm = match words.norm(&phrase).await {
            Ok(norm) => norm,
            Err(err) => {
                tracing::error!("words norm failed for id {}: {}", id, err);
                continue;
            }
        };

        let comic = NewComic {
            id: info.id,
            url: info.url,
            title: info.title,
            description: info.description,
            words: norm,
        };

        if let Err(err) = db.add(&comic).await {
            tracing::error!("db add failed for id {}: {}", id, err);
        }
    }
}
