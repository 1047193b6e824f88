//! Website quality probe: latency, transport security and basic markup hygiene.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rivalscope_core::{SourceKind, SourcePayload};

use crate::collector::SourceFetcher;
use crate::error::SourceError;

use super::check_status;

static TITLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>\s*\S.*?</title>").ok());
static META_DESCRIPTION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?is)<meta[^>]+name\s*=\s*["']description["']"#).ok());
static VIEWPORT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?is)<meta[^>]+name\s*=\s*["']viewport["']"#).ok());

/// Fetches the subject's site, URL built from a `{subject}` template.
#[derive(Debug, Clone)]
pub struct WebsiteFetcher {
    client: Client,
    url_template: String,
}

impl WebsiteFetcher {
    #[must_use]
    pub fn new(client: Client, url_template: &str) -> Self {
        Self {
            client,
            url_template: url_template.to_owned(),
        }
    }

    fn site_url(&self, subject_id: &str) -> String {
        self.url_template.replace("{subject}", subject_id)
    }
}

#[async_trait]
impl SourceFetcher for WebsiteFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::WebsiteQuality
    }

    async fn fetch(&self, subject_id: &str, _area_id: &str) -> Result<SourcePayload, SourceError> {
        let url = self.site_url(subject_id);
        let started = Instant::now();
        let response = check_status(self.client.get(&url).send().await?, &url)?;
        let https = response.url().scheme() == "https";
        let html = response.text().await?;
        let response_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(assess(&html, response_ms, https))
    }
}

fn matches(re: &LazyLock<Option<Regex>>, html: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(html))
}

/// Scores a page out of 100.
///
/// | Check                 | Points                              |
/// |-----------------------|-------------------------------------|
/// | served over HTTPS     | 25                                  |
/// | non-empty `<title>`   | 15                                  |
/// | meta description      | 15                                  |
/// | viewport meta         | 15                                  |
/// | response time         | 30 at ≤ 300 ms, 0 at ≥ 3000 ms      |
pub(crate) fn assess(html: &str, response_ms: u64, https: bool) -> SourcePayload {
    let has_title = matches(&TITLE_RE, html);
    let has_meta_description = matches(&META_DESCRIPTION_RE, html);
    let has_viewport = matches(&VIEWPORT_RE, html);

    #[allow(clippy::cast_precision_loss)]
    let speed = {
        let ms = response_ms.clamp(300, 3000) as f64;
        30.0 * (3000.0 - ms) / 2700.0
    };
    let flag = |on: bool, points: f64| if on { points } else { 0.0 };
    let quality_score = flag(https, 25.0)
        + flag(has_title, 15.0)
        + flag(has_meta_description, 15.0)
        + flag(has_viewport, 15.0)
        + speed;

    SourcePayload::WebsiteQuality {
        quality_score,
        response_ms,
        https,
        page_bytes: html.len() as u64,
        has_title,
        has_meta_description,
        has_viewport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_PAGE: &str = r#"<!doctype html><html><head>
        <title>Acme | Home</title>
        <meta name="description" content="Acme makes things">
        <meta name="viewport" content="width=device-width">
        </head><body>hi</body></html>"#;

    fn score(payload: &SourcePayload) -> f64 {
        match payload {
            SourcePayload::WebsiteQuality { quality_score, .. } => *quality_score,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn fast_complete_https_page_scores_full_marks() {
        let payload = assess(GOOD_PAGE, 120, true);
        assert!((score(&payload) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn slow_bare_http_page_scores_zero() {
        let payload = assess("<html><title> </title></html>", 5000, false);
        assert!(score(&payload).abs() < 1e-9);
        if let SourcePayload::WebsiteQuality { has_title, .. } = payload {
            assert!(!has_title, "blank title does not count");
        }
    }

    #[test]
    fn response_time_scales_linearly() {
        let payload = assess("", 1650, false);
        assert!((score(&payload) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn site_url_substitutes_subject() {
        let fetcher = WebsiteFetcher::new(Client::new(), "https://{subject}.example");
        assert_eq!(fetcher.site_url("acme"), "https://acme.example");
    }
}
