use std::collections::HashSet;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::search::types::Comic;
use crate::update::types::{DbStats, NewComic};

/// PostgreSQL deadlock SQLSTATE; the only error class worth retrying.
const DEADLOCK_CODE: &str = "40P01";
const MAX_ADD_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(150);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS comics (
    id      BIGINT PRIMARY KEY,
    img_url TEXT NOT NULL,
    title   TEXT NOT NULL,
    alt     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS words (
    id   BIGSERIAL PRIMARY KEY,
    word TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS comic_words (
    comic_id BIGINT NOT NULL REFERENCES comics (id) ON DELETE CASCADE,
    word_id  BIGINT NOT NULL REFERENCES words (id) ON DELETE CASCADE,
    UNIQUE (comic_id, word_id)
);
"#;

pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn connect(address: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(address)
            .await?;

        tracing::info!("connected to database");
        Ok(Self { pool })
    }

    /// Create the schema if it is not there yet. Safe to run on every start.
    pub async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a comic together with its word associations.
    ///
    /// The whole write is one transaction, retried on deadlock. See the module
    /// docs for the invariant this protects.
    pub async fn add(&self, comic: &NewComic) -> Result<()> {
        let words = prepare_words(&comic.words);

        let mut last_err = None;
        for attempt in 1..=MAX_ADD_ATTEMPTS {
            match self.add_once(comic, &words).await {
                Ok(()) => return Ok(()),
                Err(err) if is_deadlock(&err) => {
                    tracing::warn!(
                        "deadlock adding comic {}, attempt {}/{}",
                        comic.id,
                        attempt,
                        MAX_ADD_ATTEMPTS
                    );
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    last_err = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Attempts exhausted; report the final deadlock.
        Err(last_err.expect("retry loop ran at least once").into())
    }

    async fn add_once(&self, comic: &NewComic, words: &[String]) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO comics (id, img_url, title, alt)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(comic.id)
        .bind(&comic.url)
        .bind(&comic.title)
        .bind(&comic.description)
        .execute(&mut *tx)
        .await?;

        for word in words {
            // The no-op update forces a RETURNING row on conflict.
            let word_id: i64 = sqlx::query_scalar(
                "INSERT INTO words (word) VALUES ($1)
                 ON CONFLICT (word) DO UPDATE SET word = EXCLUDED.word
                 RETURNING id",
            )
            .bind(word)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO comic_words (comic_id, word_id)
                 VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(comic.id)
            .bind(word_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// Ids of every stored comic, ascending.
    pub async fn ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM comics ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn stats(&self) -> Result<DbStats> {
        let comics_fetched = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM comics")
            .fetch_one(&self.pool)
            .await?;
        let words_unique = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM words")
            .fetch_one(&self.pool)
            .await?;
        let words_total = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM comic_words")
            .fetch_one(&self.pool)
            .await?;

        Ok(DbStats {
            words_total,
            words_unique,
            comics_fetched,
        })
    }

    /// Full corpus projection used by the ranking engine and the index rebuild.
    pub async fn search_all(&self) -> Result<Vec<Comic>> {
        let rows = sqlx::query(
            "SELECT c.id, c.img_url,
                    COALESCE(array_agg(w.word) FILTER (WHERE w.word IS NOT NULL), '{}') AS words
             FROM comics c
             LEFT JOIN comic_words cw ON cw.comic_id = c.id
             LEFT JOIN words w ON w.id = cw.word_id
             GROUP BY c.id, c.img_url",
        )
        .fetch_all(&self.pool)
        .await?;

        let comics = rows
            .into_iter()
            .map(|row| Comic {
                id: row.get("id"),
                url: row.get("img_url"),
                words: row.get("words"),
            })
            .collect();
        Ok(comics)
    }

    /// Erase the whole corpus.
    pub async fn drop_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE comic_words, words, comics RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::update::service::Db for Storage {
    async fn add(&self, comic: &NewComic) -> Result<()> {
        Storage::add(self, comic).await
    }

    async fn ids(&self) -> Result<Vec<i64>> {
        Storage::ids(self).await
    }

    async fn stats(&self) -> Result<DbStats> {
        Storage::stats(self).await
    }

    async fn drop_all(&self) -> Result<()> {
        Storage::drop_all(self).await
    }

    async fn ping(&self) -> Result<()> {
        Storage::ping(self).await
    }
}

#[async_trait::async_trait]
impl crate::search::service::Db for Storage {
    async fn search_all(&self) -> Result<Vec<Comic>> {
        Storage::search_all(self).await
    }

    async fn ping(&self) -> Result<()> {
        Storage::ping(self).await
    }
}

/// Dedupe and sort a word list before writing. Sorting gives concurrent
/// transactions a common lock order, which lowers the deadlock rate.
pub(crate) fn prepare_words(words: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut uniq: Vec<String> = words
        .iter()
        .filter(|w| seen.insert(w.as_str()))
        .cloned()
        .collect();
    uniq.sort();
    uniq
}

pub(crate) fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map_or(false, |code| code.as_ref() == DEADLOCK_CODE),
        _ => false,
    }
}
