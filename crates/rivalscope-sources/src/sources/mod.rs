//! HTTP-backed fetchers, one per [`rivalscope_core::SourceKind`].

mod news;
mod reviews;
mod social;
mod website;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::SourceError;

pub use news::NewsFetcher;
pub use reviews::ReviewsFetcher;
pub use social::SocialFetcher;
pub use website::WebsiteFetcher;

/// Builds the shared client used by every fetcher.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the client cannot be constructed.
pub fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client, SourceError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Maps a non-2xx response to a typed error, passing successes through.
pub(crate) fn check_status(response: Response, url: &str) -> Result<Response, SourceError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(SourceError::RateLimited {
            url: url.to_owned(),
            retry_after_secs,
        });
    }

    if !status.is_success() {
        return Err(SourceError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    Ok(response)
}

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_owned()
}
