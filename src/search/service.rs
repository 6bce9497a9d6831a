use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::Comic;
use crate::error::{Error, Result};
use crate::words::Normalizer;

/// Storage port of the ranking engine.
#[async_trait]
pub trait Db: Send + Sync {
    async fn search_all(&self) -> Result<Vec<Comic>>;
    async fn ping(&self) -> Result<()>;
}

/// The paired maps consulted by the indexed path. Replaced as a whole on
/// rebuild; readers never see one map without its counterpart.
#[derive(Default)]
struct Snapshot {
    index: HashMap<String, Vec<i64>>,
    comics: HashMap<i64, Comic>,
}

pub struct SearchService {
    db: Arc<dyn Db>,
    words: Arc<dyn Normalizer>,
    snapshot: RwLock<Snapshot>,
}

struct Scored {
    comic: Comic,
    matches: usize,
    ratio: f64,
}

impl SearchService {
    pub fn new(db: Arc<dyn Db>, words: Arc<dyn Normalizer>) -> Arc<Self> {
        Arc::new(Self {
            db,
            words,
            snapshot: RwLock::new(Snapshot::default()),
        })
    }

    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    fn validate(phrase: &str, limit: i64) -> Result<()> {
        if phrase.is_empty() || limit <= 0 {
            return Err(Error::BadArguments);
        }
        Ok(())
    }

    /// Baseline search: scan every comic from the database and score it.
    ///
    /// No caching; the corpus is small enough that this stays the correctness
    /// oracle for the indexed path.
    pub async fn search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        Self::validate(phrase, limit)?;

        let qwords = self.words.norm(phrase).await?;
        if qwords.is_empty() {
            return Ok(Vec::new());
        }
        let qset: HashSet<&str> = qwords.iter().map(String::as_str).collect();

        let comics = self.db.search_all().await?;

        let mut scored = Vec::new();
        for comic in comics {
            if comic.words.is_empty() {
                continue;
            }
            let matches = comic
                .words
                .iter()
                .filter(|w| qset.contains(w.as_str()))
                .count();
            if matches == 0 {
                continue;
            }
            let ratio = matches as f64 / comic.words.len() as f64;
            scored.push(Scored {
                comic,
                matches,
                ratio,
            });
        }

        Ok(rank(scored, limit))
    }

    /// Indexed search: same contract and scoring as [`search`](Self::search),
    /// resolved against the in-memory snapshot instead of the database.
    pub async fn index_search(&self, phrase: &str, limit: i64) -> Result<Vec<Comic>> {
        Self::validate(phrase, limit)?;

        let qwords = self.words.norm(phrase).await?;
        if qwords.is_empty() {
            return Ok(Vec::new());
        }

        let snap = self.snapshot.read().await;
        if snap.index.is_empty() || snap.comics.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches_by_id: HashMap<i64, usize> = HashMap::new();
        for word in &qwords {
            if let Some(ids) = snap.index.get(word) {
                for id in ids {
                    *matches_by_id.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let mut scored = Vec::with_capacity(matches_by_id.len());
        for (id, matches) in matches_by_id {
            // An id without a comic is a stale index entry; skip it silently.
            let Some(comic) = snap.comics.get(&id) else {
                continue;
            };
            if comic.words.is_empty() {
                continue;
            }
            let ratio = matches as f64 / comic.words.len() as f64;
            scored.push(Scored {
                comic: comic.clone(),
                matches,
                ratio,
            });
        }
        drop(snap);

        Ok(rank(scored, limit))
    }

    /// Rebuild the snapshot from the database and swap it in.
    ///
    /// Construction happens without any lock; the writer lock is held only
    /// across the swap, so readers see either the old or the new snapshot and
    /// never a mix. Concurrent rebuilds are harmless: last writer wins.
    pub async fn rebuild_index(&self) -> Result<()> {
        let comics = self.db.search_all().await?;

        let mut index: HashMap<String, Vec<i64>> = HashMap::new();
        let mut by_id: HashMap<i64, Comic> = HashMap::with_capacity(comics.len());

        for comic in comics {
            for word in &comic.words {
                index.entry(word.clone()).or_default().push(comic.id);
            }
            by_id.insert(comic.id, comic);
        }

        let (comics_count, words_count) = (by_id.len(), index.len());
        {
            let mut snap = self.snapshot.write().await;
            *snap = Snapshot {
                index,
                comics: by_id,
            };
        }

        tracing::info!(
            "search index rebuilt: {} comics, {} words",
            comics_count,
            words_count
        );
        Ok(())
    }

    /// Both cardinalities read under a single lock acquisition, for asserting
    /// snapshot consistency from concurrent readers.
    #[cfg(test)]
    pub(crate) async fn snapshot_sizes(&self) -> (usize, usize) {
        let snap = self.snapshot.read().await;
        (snap.comics.len(), snap.index.len())
    }

    #[cfg(test)]
    pub(crate) async fn install_snapshot(
        &self,
        index: HashMap<String, Vec<i64>>,
        comics: HashMap<i64, Comic>,
    ) {
        let mut snap = self.snapshot.write().await;
        *snap = Snapshot { index, comics };
    }
}

/// Order by matches descending, ratio descending, id ascending, then truncate.
fn rank(mut scored: Vec<Scored>, limit: i64) -> Vec<Comic> {
    scored.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then_with(|| b.ratio.partial_cmp(&a.ratio).unwrap_or(Ordering::Equal))
            .then_with(|| a.comic.id.cmp(&b.comic.id))
    });

    scored
        .into_iter()
        .take(limit as usize)
        .map(|s| s.comic)
        .collect()
}
