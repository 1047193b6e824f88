//! Comparison requests and the identifiers they carry.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CoreError;

const MAX_ID_LEN: usize = 128;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static id pattern"));

/// External data category collected independently per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    News,
    SocialMedia,
    EmployerReviews,
    WebsiteQuality,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::News,
        SourceKind::SocialMedia,
        SourceKind::EmployerReviews,
        SourceKind::WebsiteQuality,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::News => "news",
            SourceKind::SocialMedia => "social_media",
            SourceKind::EmployerReviews => "employer_reviews",
            SourceKind::WebsiteQuality => "website_quality",
        }
    }

    /// Human label used in insights and roadmap items.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::News => "news coverage",
            SourceKind::SocialMedia => "social sentiment",
            SourceKind::EmployerReviews => "employer reputation",
            SourceKind::WebsiteQuality => "website quality",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    /// Accepts the wire name plus a few aliases the client has historically sent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(SourceKind::News),
            "social_media" | "socialmedia" | "social" => Ok(SourceKind::SocialMedia),
            "employer_reviews" | "employerreviews" | "glassdoor" | "reviews" => {
                Ok(SourceKind::EmployerReviews)
            }
            "website_quality" | "websitequality" | "website" => Ok(SourceKind::WebsiteQuality),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

/// Which side of the comparison a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Brand,
    Competitor,
}

impl Subject {
    pub const BOTH: [Subject; 2] = [Subject::Brand, Subject::Competitor];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Brand => "brand",
            Subject::Competitor => "competitor",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input to a comparison, created once by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
    pub request_id: String,
    pub brand_id: String,
    pub competitor_id: String,
    pub area_id: String,
    pub sources: BTreeSet<SourceKind>,
}

impl ComparisonRequest {
    /// Builds a validated request.
    ///
    /// `sources = None` selects every known [`SourceKind`]; `Some` must name at
    /// least one known kind. Brand and competitor ids are checked with
    /// [`validate_subject_id`] only for emptiness here: a malformed subject id
    /// is a per-source `Failed` result, not a rejected request.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] for an empty request/area/subject id, identical
    /// subjects, an empty source list or an unknown source name.
    pub fn new(
        request_id: impl Into<String>,
        brand_id: impl Into<String>,
        competitor_id: impl Into<String>,
        area_id: impl Into<String>,
        sources: Option<&[String]>,
    ) -> Result<Self, CoreError> {
        let request_id = non_empty("requestId", request_id.into())?;
        let brand_id = non_empty("brandId", brand_id.into())?;
        let competitor_id = non_empty("competitorId", competitor_id.into())?;
        let area_id = non_empty("areaId", area_id.into())?;

        if request_id.len() > MAX_ID_LEN {
            return Err(CoreError::InvalidField {
                field: "requestId",
                reason: format!("longer than {MAX_ID_LEN} characters"),
            });
        }
        if brand_id == competitor_id {
            return Err(CoreError::SameSubject(brand_id));
        }

        Ok(Self {
            request_id,
            brand_id,
            competitor_id,
            area_id,
            sources: parse_sources(sources)?,
        })
    }

    #[must_use]
    pub fn subject_id(&self, subject: Subject) -> &str {
        match subject {
            Subject::Brand => &self.brand_id,
            Subject::Competitor => &self.competitor_id,
        }
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn parse_sources(raw: Option<&[String]>) -> Result<BTreeSet<SourceKind>, CoreError> {
    let Some(raw) = raw else {
        return Ok(SourceKind::ALL.into_iter().collect());
    };
    if raw.is_empty() {
        return Err(CoreError::EmptySources);
    }
    raw.iter().map(|s| s.parse::<SourceKind>()).collect()
}

/// Checks that a subject id can be used to address an external source.
///
/// # Errors
///
/// Returns [`CoreError::InvalidField`] for empty ids, ids longer than 128
/// characters, or ids containing characters outside `[A-Za-z0-9._-]`.
pub fn validate_subject_id(id: &str) -> Result<(), CoreError> {
    let reason = if id.is_empty() {
        "must not be empty".to_string()
    } else if id.len() > MAX_ID_LEN {
        format!("longer than {MAX_ID_LEN} characters")
    } else if !ID_PATTERN.is_match(id) {
        format!("{id:?} contains characters outside [A-Za-z0-9._-]")
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidField {
        field: "subjectId",
        reason,
    })
}
