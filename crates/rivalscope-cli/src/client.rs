//! HTTP client for the rivalscope server API.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use rivalscope_core::{AnalysisRecord, AnalysisResult, ComparisonRequest, LedgerRecord};
use rivalscope_pipeline::{StatusSource, TransportError};
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;

/// Unreserved characters stay literal in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Acknowledgement of `POST /api/v1/collection/start`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartedCollection {
    pub job_id: Uuid,
    pub status: String,
    pub estimated_duration: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub(crate) fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rivalscope-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    pub(crate) async fn start_collection(
        &self,
        request: &ComparisonRequest,
    ) -> anyhow::Result<StartedCollection> {
        let response = self
            .http
            .post(self.url("collection/start"))
            .json(request)
            .send()
            .await
            .context("failed to reach server")?;
        decode(response).await
    }

    /// `Ok(None)` when the server has no record for `request_id`.
    pub(crate) async fn ledger(&self, request_id: &str) -> anyhow::Result<Option<LedgerRecord>> {
        let encoded = utf8_percent_encode(request_id, PATH_SEGMENT);
        let response = self
            .http
            .get(self.url(&format!("ledger/{encoded}")))
            .send()
            .await
            .context("failed to reach server")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    pub(crate) async fn analysis(&self, analysis_job_id: Uuid) -> anyhow::Result<AnalysisRecord> {
        let response = self
            .http
            .get(self.url(&format!("analysis/{analysis_job_id}")))
            .send()
            .await
            .context("failed to reach server")?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    let envelope: Envelope<T> = response
        .json()
        .await
        .with_context(|| format!("unexpected response body (HTTP {status})"))?;
    match envelope {
        Envelope {
            success: true,
            data: Some(data),
            ..
        } => Ok(data),
        Envelope {
            error: Some(error), ..
        } => bail!("{} (HTTP {status}): {}", error.code, error.message),
        _ => bail!("malformed response envelope (HTTP {status})"),
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn ledger(&self, request_id: &str) -> Result<Option<LedgerRecord>, TransportError> {
        ApiClient::ledger(self, request_id)
            .await
            .map_err(|e| TransportError(format!("{e:#}")))
    }

    async fn analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisResult, TransportError> {
        let record = ApiClient::analysis(self, analysis_job_id)
            .await
            .map_err(|e| TransportError(format!("{e:#}")))?;
        record.result.ok_or_else(|| {
            TransportError(format!("analysis {analysis_job_id} has no stored result"))
        })
    }
}
