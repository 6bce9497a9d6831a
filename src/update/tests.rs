//! Ingestion Engine Tests
//!
//! Exercises the crawl lifecycle against mock ports: the singleton run guard,
//! reconciliation, the per-id error policy of the worker pool, cancellation,
//! and event publication.

#[cfg(test)]
mod tests {
    use crate::error::{Error, Result};
    use crate::update::service::{worker, Db, EventPublisher, UpdateService, Xkcd};
    use crate::update::types::{DbStats, NewComic, UpdateStatus, XkcdInfo};
    use crate::words::Normalizer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    // ============================================================
    // MOCK PORTS
    // ============================================================

    #[derive(Default)]
    struct MockDb {
        ids: Vec<i64>,
        ids_fails: bool,
        stats: DbStats,
        stats_fails: bool,
        drop_fails: bool,
        add_fails: bool,
        added: Mutex<Vec<i64>>,
        drop_calls: AtomicUsize,
    }

    #[async_trait]
    impl Db for MockDb {
        async fn add(&self, comic: &NewComic) -> Result<()> {
            self.added.lock().unwrap().push(comic.id);
            if self.add_fails {
                return Err(Error::internal("db add failed"));
            }
            Ok(())
        }

        async fn ids(&self) -> Result<Vec<i64>> {
            if self.ids_fails {
                return Err(Error::internal("ids failed"));
            }
            Ok(self.ids.clone())
        }

        async fn stats(&self) -> Result<DbStats> {
            if self.stats_fails {
                return Err(Error::internal("stats failed"));
            }
            Ok(self.stats.clone())
        }

        async fn drop_all(&self) -> Result<()> {
            self.drop_calls.fetch_add(1, Ordering::SeqCst);
            if self.drop_fails {
                return Err(Error::internal("drop failed"));
            }
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockXkcd {
        last: i64,
        last_fails: bool,
        get_fails: bool,
        get_delay: Option<Duration>,
        fetched: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Xkcd for MockXkcd {
        async fn get(&self, id: i64) -> Result<XkcdInfo> {
            self.fetched.lock().unwrap().push(id);
            if let Some(delay) = self.get_delay {
                tokio::time::sleep(delay).await;
            }
            if self.get_fails {
                return Err(Error::internal("xkcd get failed"));
            }
            Ok(XkcdInfo {
                id,
                url: format!("http://example.com/{}.png", id),
                title: "title".to_string(),
                description: "desc".to_string(),
            })
        }

        async fn last_id(&self) -> Result<i64> {
            if self.last_fails {
                return Err(Error::internal("last id failed"));
            }
            Ok(self.last)
        }
    }

    #[derive(Default)]
    struct MockWords {
        fails: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Normalizer for MockWords {
        async fn norm(&self, _phrase: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(Error::internal("norm failed"));
            }
            Ok(vec!["token".to_string()])
        }
    }

    #[derive(Default)]
    struct MockEvents {
        fails: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for MockEvents {
        async fn notify_db_changed(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(Error::internal("notify failed"));
            }
            Ok(())
        }
    }

    struct Fixture {
        db: Arc<MockDb>,
        xkcd: Arc<MockXkcd>,
        words: Arc<MockWords>,
        events: Arc<MockEvents>,
    }

    impl Fixture {
        fn new(db: MockDb, xkcd: MockXkcd) -> Self {
            Self {
                db: Arc::new(db),
                xkcd: Arc::new(xkcd),
                words: Arc::new(MockWords::default()),
                events: Arc::new(MockEvents::default()),
            }
        }

        fn service(&self, concurrency: usize) -> Arc<UpdateService> {
            UpdateService::new(
                self.db.clone(),
                self.xkcd.clone(),
                self.words.clone(),
                self.events.clone(),
                concurrency,
            )
            .unwrap()
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test
        std::mem::forget(tx);
        rx
    }

    // ============================================================
    // CONSTRUCTOR
    // ============================================================

    #[test]
    fn test_new_service_rejects_zero_concurrency() {
        let f = Fixture::new(MockDb::default(), MockXkcd::default());
        let result = UpdateService::new(f.db, f.xkcd, f.words, f.events, 0);
        assert!(result.is_err());
    }

    // ============================================================
    // UPDATE - run guard and reconciliation
    // ============================================================

    #[tokio::test]
    async fn test_update_already_running() {
        let f = Fixture::new(MockDb::default(), MockXkcd::default());
        let svc = f.service(1);

        svc.running.store(true, Ordering::SeqCst);

        let err = svc.update(no_cancel()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
        // The losing caller must not clear the winner's flag
        assert_eq!(svc.status(), UpdateStatus::Running);
    }

    #[tokio::test]
    async fn test_update_last_id_error() {
        let xkcd = MockXkcd {
            last_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(1);

        assert!(svc.update(no_cancel()).await.is_err());
        assert_eq!(svc.status(), UpdateStatus::Idle);
    }

    #[tokio::test]
    async fn test_update_ids_error() {
        let db = MockDb {
            ids_fails: true,
            ..Default::default()
        };
        let xkcd = MockXkcd {
            last: 10,
            ..Default::default()
        };
        let f = Fixture::new(db, xkcd);
        let svc = f.service(1);

        assert!(svc.update(no_cancel()).await.is_err());
        assert_eq!(svc.status(), UpdateStatus::Idle);
    }

    #[tokio::test]
    async fn test_update_no_missing_no_notify() {
        let db = MockDb {
            ids: vec![1, 2, 3],
            ..Default::default()
        };
        let xkcd = MockXkcd {
            last: 3,
            ..Default::default()
        };
        let f = Fixture::new(db, xkcd);
        let svc = f.service(2);

        svc.update(no_cancel()).await.unwrap();

        assert!(f.xkcd.fetched.lock().unwrap().is_empty());
        assert!(f.db.added.lock().unwrap().is_empty());
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_empty_remote_corpus() {
        // last id 0 leaves nothing to fetch; success, no publication
        let f = Fixture::new(MockDb::default(), MockXkcd::default());
        let svc = f.service(1);

        svc.update(no_cancel()).await.unwrap();

        assert!(f.xkcd.fetched.lock().unwrap().is_empty());
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_fetches_missing_and_notifies_once() {
        // last = 5 and [2, 3] stored locally leaves [1, 4, 5] to fetch
        let db = MockDb {
            ids: vec![2, 3],
            ..Default::default()
        };
        let xkcd = MockXkcd {
            last: 5,
            ..Default::default()
        };
        let f = Fixture::new(db, xkcd);
        let svc = f.service(2);

        svc.update(no_cancel()).await.unwrap();

        let mut fetched = f.xkcd.fetched.lock().unwrap().clone();
        fetched.sort();
        assert_eq!(fetched, vec![1, 4, 5]);

        let mut added = f.db.added.lock().unwrap().clone();
        added.sort();
        assert_eq!(added, vec![1, 4, 5]);

        assert_eq!(f.events.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_skips_404() {
        let xkcd = MockXkcd {
            last: 405,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(4);

        svc.update(no_cancel()).await.unwrap();

        let fetched = f.xkcd.fetched.lock().unwrap().clone();
        assert_eq!(fetched.len(), 404);
        assert!(!fetched.contains(&404));
        assert!(!f.db.added.lock().unwrap().contains(&404));
    }

    #[tokio::test]
    async fn test_update_cancelled_before_start() {
        let xkcd = MockXkcd {
            last: 5,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(1);

        let (tx, rx) = watch::channel(true);

        let err = svc.update(rx).await.unwrap_err();
        assert!(matches!(err, Error::Canceled));
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 0);
        // Flag is released on the cancellation path too
        assert_eq!(svc.status(), UpdateStatus::Idle);
        drop(tx);
    }

    #[tokio::test]
    async fn test_update_cancelled_mid_crawl() {
        // A slow fetcher keeps the pool busy so cancellation lands while the
        // producer is still feeding ids.
        let db = MockDb::default();
        let xkcd = MockXkcd {
            last: 50,
            get_delay: Some(Duration::from_millis(30)),
            ..Default::default()
        };
        let f = Fixture::new(db, xkcd);
        let svc = f.service(1);

        let (tx, rx) = watch::channel(false);
        let handle = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.update(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Canceled));
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 0);
        assert_eq!(svc.status(), UpdateStatus::Idle);
        // Workers finished their in-flight jobs instead of being torn down,
        // so whatever was fetched by then is also the set that got added
        assert!(f.xkcd.fetched.lock().unwrap().len() < 50);
    }

    #[tokio::test]
    async fn test_update_notify_error_surfaces() {
        let xkcd = MockXkcd {
            last: 1,
            ..Default::default()
        };
        let mut f = Fixture::new(MockDb::default(), xkcd);
        f.events = Arc::new(MockEvents {
            fails: true,
            ..Default::default()
        });
        let svc = f.service(1);

        let err = svc.update(no_cancel()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        // The crawl itself completed before the publish failed
        assert_eq!(f.db.added.lock().unwrap().clone(), vec![1]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_exactly_one_wins() {
        let xkcd = MockXkcd {
            last: 10,
            get_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(2);

        let first = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.update(no_cancel()).await })
        };
        // Give the first call time to take the flag
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = svc.update(no_cancel()).await;

        assert!(matches!(second.unwrap_err(), Error::AlreadyExists));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 1);
    }

    // ============================================================
    // WORKER - per-id error policy
    // ============================================================

    async fn run_single_worker(f: &Fixture, ids: &[i64]) {
        let (tx, rx) = tokio::sync::mpsc::channel(ids.len().max(1));
        for id in ids {
            tx.send(*id).await.unwrap();
        }
        drop(tx);

        worker(
            f.db.clone(),
            f.xkcd.clone(),
            f.words.clone(),
            Arc::new(tokio::sync::Mutex::new(rx)),
        )
        .await;
    }

    #[tokio::test]
    async fn test_worker_skips_id_on_fetch_error() {
        let xkcd = MockXkcd {
            get_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);

        run_single_worker(&f, &[1, 2]).await;

        assert_eq!(f.words.calls.load(Ordering::SeqCst), 0);
        assert!(f.db.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_skips_id_on_norm_error() {
        let mut f = Fixture::new(MockDb::default(), MockXkcd::default());
        f.words = Arc::new(MockWords {
            fails: true,
            ..Default::default()
        });

        run_single_worker(&f, &[1]).await;

        assert_eq!(f.words.calls.load(Ordering::SeqCst), 1);
        assert!(f.db.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_continues_after_add_error() {
        let db = MockDb {
            add_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(db, MockXkcd::default());

        run_single_worker(&f, &[1, 2]).await;

        // Both adds attempted despite the first one failing
        assert_eq!(f.db.added.lock().unwrap().clone(), vec![1, 2]);
    }

    // ============================================================
    // STATS / STATUS / DROP
    // ============================================================

    #[tokio::test]
    async fn test_stats_db_error() {
        let db = MockDb {
            stats_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(db, MockXkcd::default());
        let svc = f.service(1);

        assert!(svc.stats().await.is_err());
    }

    #[tokio::test]
    async fn test_stats_last_id_error() {
        let xkcd = MockXkcd {
            last_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(1);

        assert!(svc.stats().await.is_err());
    }

    #[tokio::test]
    async fn test_stats_total_before_the_hole() {
        let db = MockDb {
            stats: DbStats {
                words_total: 100,
                words_unique: 20,
                comics_fetched: 10,
            },
            ..Default::default()
        };
        let xkcd = MockXkcd {
            last: 10,
            ..Default::default()
        };
        let f = Fixture::new(db, xkcd);
        let svc = f.service(1);

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.comics_total, 10);
        assert_eq!(stats.words_total, 100);
        assert_eq!(stats.words_unique, 20);
        assert_eq!(stats.comics_fetched, 10);
    }

    #[tokio::test]
    async fn test_stats_total_subtracts_the_hole() {
        let xkcd = MockXkcd {
            last: 405,
            ..Default::default()
        };
        let f = Fixture::new(MockDb::default(), xkcd);
        let svc = f.service(1);

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.comics_total, 404);
    }

    #[tokio::test]
    async fn test_status_reflects_run_flag() {
        let f = Fixture::new(MockDb::default(), MockXkcd::default());
        let svc = f.service(1);

        assert_eq!(svc.status(), UpdateStatus::Idle);

        svc.running.store(true, Ordering::SeqCst);
        assert_eq!(svc.status(), UpdateStatus::Running);
    }

    #[tokio::test]
    async fn test_drop_db_error_skips_notify() {
        let db = MockDb {
            drop_fails: true,
            ..Default::default()
        };
        let f = Fixture::new(db, MockXkcd::default());
        let svc = f.service(1);

        assert!(svc.drop_all().await.is_err());
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_notify_error_surfaces() {
        let mut f = Fixture::new(MockDb::default(), MockXkcd::default());
        f.events = Arc::new(MockEvents {
            fails: true,
            ..Default::default()
        });
        let svc = f.service(1);

        assert!(svc.drop_all().await.is_err());
        assert_eq!(f.db.drop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_success_notifies_once() {
        let f = Fixture::new(MockDb::default(), MockXkcd::default());
        let svc = f.service(1);

        svc.drop_all().await.unwrap();
        assert_eq!(f.db.drop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.events.calls.load(Ordering::SeqCst), 1);
    }
}
