//! Employer-review aggregate for a company in an area.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use rivalscope_core::{SourceKind, SourcePayload};
use serde::Deserialize;

use crate::collector::SourceFetcher;
use crate::error::SourceError;

use super::{check_status, trim_base};

#[derive(Debug, Deserialize)]
struct ReviewSummary {
    rating: f64,
    review_count: u32,
    #[serde(default)]
    recommend_pct: Option<f64>,
}

/// Reads `{base}/v1/companies/{subject}/reviews?area={area}`.
#[derive(Debug, Clone)]
pub struct ReviewsFetcher {
    client: Client,
    base_url: String,
}

impl ReviewsFetcher {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    fn reviews_url(&self, subject_id: &str, area_id: &str) -> String {
        let area = utf8_percent_encode(area_id, NON_ALPHANUMERIC);
        format!(
            "{}/v1/companies/{subject_id}/reviews?area={area}",
            self.base_url
        )
    }
}

#[async_trait]
impl SourceFetcher for ReviewsFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::EmployerReviews
    }

    async fn fetch(&self, subject_id: &str, area_id: &str) -> Result<SourcePayload, SourceError> {
        let url = self.reviews_url(subject_id, area_id);
        let response = self.client.get(&url).send().await?;
        let body = check_status(response, &url)?.text().await?;
        let summary: ReviewSummary =
            serde_json::from_str(&body).map_err(|e| SourceError::Deserialize {
                context: format!("employer reviews for {subject_id}"),
                source: e,
            })?;

        Ok(to_payload(&summary))
    }
}

/// Clamps the upstream values into their documented ranges. A missing
/// recommendation share is estimated from the star rating.
fn to_payload(summary: &ReviewSummary) -> SourcePayload {
    let rating = summary.rating.clamp(0.0, 5.0);
    let recommend_pct = summary
        .recommend_pct
        .map_or(rating / 5.0 * 100.0, |pct| pct.clamp(0.0, 100.0));
    SourcePayload::EmployerReviews {
        rating,
        review_count: summary.review_count,
        recommend_pct,
    }
}
