use async_trait::async_trait;

use super::normalizer::normalize;
use crate::error::{Error, Result};

/// Upper bound on an input phrase, in bytes. Larger inputs are refused rather
/// than normalized: the corpus never produces them and a query never needs them.
pub const MAX_PHRASE_LEN: usize = 4 << 10;

/// Normalization port consumed by the ingestion and search services.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn norm(&self, phrase: &str) -> Result<Vec<String>>;
}

/// In-process implementation of the normalizer service.
#[derive(Debug, Default)]
pub struct WordsService;

impl WordsService {
    pub fn new() -> Self {
        Self
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Normalizer for WordsService {
    async fn norm(&self, phrase: &str) -> Result<Vec<String>> {
        if phrase.len() > MAX_PHRASE_LEN {
            return Err(Error::PhraseTooLarge);
        }
        Ok(normalize(phrase))
    }
}
