use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::service::Xkcd;
use super::types::XkcdInfo;
use crate::error::{Error, Result};

/// HTTP client for the remote comic archive.
///
/// The archive exposes `GET /<id>/info.0.json` per comic and
/// `GET /info.0.json` for the latest one.
pub struct XkcdClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct XkcdResponse {
    num: i64,
    #[serde(default)]
    img: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    safe_title: String,
    #[serde(default)]
    alt: String,
    #[serde(default)]
    transcript: String,
}

impl XkcdClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::internal("empty xkcd base url specified"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<XkcdResponse> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.json::<XkcdResponse>().await?;
        Ok(body)
    }
}

/// Merge the textual fields into one description, skipping blank ones.
fn description_of(resp: &XkcdResponse) -> String {
    [&resp.safe_title, &resp.transcript, &resp.alt]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Xkcd for XkcdClient {
    async fn get(&self, id: i64) -> Result<XkcdInfo> {
        let url = format!("{}/{}/info.0.json", self.base_url, id);
        let resp = self.fetch(&url).await?;
        let description = description_of(&resp);

        Ok(XkcdInfo {
            id: resp.num,
            url: resp.img,
            title: resp.title,
            description,
        })
    }

    async fn last_id(&self) -> Result<i64> {
        let url = format!("{}/info.0.json", self.base_url);
        let resp = self.fetch(&url).await?;

        if resp.num <= 0 {
            return Err(Error::internal("bad comic number from xkcd"));
        }
        Ok(resp.num)
    }
}
