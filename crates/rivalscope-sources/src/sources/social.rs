//! Reddit public search as the social-media signal.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use rivalscope_core::{SourceKind, SourcePayload};
use serde::Deserialize;

use crate::collector::SourceFetcher;
use crate::error::SourceError;
use crate::scorer::lexicon_score;

use super::{check_status, trim_base};

const PAGE_LIMIT: usize = 50;

/// Reddit search listing wrapper.
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    title: Option<String>,
    selftext: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
}

impl PostData {
    fn text(&self) -> Option<String> {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        let body = self
            .selftext
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty() && *b != "[deleted]" && *b != "[removed]")
            .map(|b| b.chars().take(420).collect::<String>());
        match (title.is_empty(), body) {
            (true, None) => None,
            (true, Some(body)) => Some(body),
            (false, None) => Some(title.to_owned()),
            (false, Some(body)) => Some(format!("{title} {body}")),
        }
    }
}

/// Searches Reddit for subject mentions within an area.
#[derive(Debug, Clone)]
pub struct SocialFetcher {
    client: Client,
    base_url: String,
}

impl SocialFetcher {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    fn search_url(&self, subject_id: &str, area_id: &str) -> String {
        let query = format!("\"{subject_id}\" {area_id}");
        let encoded = utf8_percent_encode(&query, NON_ALPHANUMERIC);
        format!(
            "{}/search.json?q={encoded}&sort=new&t=month&limit={PAGE_LIMIT}",
            self.base_url
        )
    }
}

#[async_trait]
impl SourceFetcher for SocialFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::SocialMedia
    }

    async fn fetch(&self, subject_id: &str, area_id: &str) -> Result<SourcePayload, SourceError> {
        let url = self.search_url(subject_id, area_id);
        let response = self.client.get(&url).send().await?;
        let body = check_status(response, &url)?.text().await?;
        let listing: Listing =
            serde_json::from_str(&body).map_err(|e| SourceError::Deserialize {
                context: format!("reddit search for {subject_id}"),
                source: e,
            })?;

        Ok(summarize(&listing))
    }
}

fn summarize(listing: &Listing) -> SourcePayload {
    let mut sum = 0.0_f64;
    let mut scored = 0_u32;
    let mut engagement = 0_u64;

    for post in &listing.data.children {
        engagement += post.data.score.max(0).unsigned_abs() + post.data.num_comments;
        if let Some(text) = post.data.text() {
            sum += f64::from(lexicon_score(&text));
            scored += 1;
        }
    }

    SourcePayload::SocialMedia {
        sentiment: if scored == 0 { 0.0 } else { sum / f64::from(scored) },
        mention_count: u32::try_from(listing.data.children.len()).unwrap_or(u32::MAX),
        engagement,
    }
}
