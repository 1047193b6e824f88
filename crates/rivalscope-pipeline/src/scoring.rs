//! Turns a completed collection job into insights and a quarterly roadmap.
//!
//! Every usable payload is normalised to a 0–100 score. A subject's overall
//! score is the mean of its per-source scores. Insights compare brand and
//! competitor per source, ranked by absolute gap; the roadmap schedules the
//! biggest brand deficits first and closes with one item that protects the
//! brand's largest lead.

use std::collections::BTreeMap;

use chrono::Utc;
use rivalscope_core::{
    AnalysisResult, CollectionJob, Impact, Insight, JobStatus, Quarter, RoadmapItem, SourceKind,
    SourcePayload, Subject, SubjectScores,
};
use uuid::Uuid;

use crate::error::AnalysisError;

const HIGH_IMPACT_GAP: f64 = 20.0;
const MEDIUM_IMPACT_GAP: f64 = 10.0;

/// Score of one payload on a 0–100 scale.
#[must_use]
pub fn normalize(payload: &SourcePayload) -> f64 {
    let score = match payload {
        SourcePayload::News { sentiment, .. } => (sentiment + 1.0) * 50.0,
        SourcePayload::SocialMedia {
            sentiment,
            engagement,
            ..
        } => {
            // Reach saturates at 10^4 interactions.
            #[allow(clippy::cast_precision_loss)]
            let reach = ((1.0 + *engagement as f64).log10() * 25.0).min(100.0);
            0.8 * (sentiment + 1.0) * 50.0 + 0.2 * reach
        }
        SourcePayload::EmployerReviews {
            rating,
            recommend_pct,
            ..
        } => 0.6 * (rating / 5.0 * 100.0) + 0.4 * recommend_pct,
        SourcePayload::WebsiteQuality { quality_score, .. } => *quality_score,
    };
    score.clamp(0.0, 100.0)
}

/// Builds the analysis for a terminal, successful collection job.
///
/// # Errors
///
/// Returns [`AnalysisError`] when the job is not `Completed`, when either
/// subject has no usable result, or when a stored result sits under the wrong
/// source kind.
pub fn analyze(analysis_job_id: Uuid, job: &CollectionJob) -> Result<AnalysisResult, AnalysisError> {
    if job.status != JobStatus::Completed {
        return Err(AnalysisError::NotCompleted {
            job_id: job.job_id,
            status: job.status.to_string(),
        });
    }

    let brand = subject_scores(job, Subject::Brand)?;
    let competitor = subject_scores(job, Subject::Competitor)?;
    let insights = rank_insights(&brand, &competitor);
    let roadmap = build_roadmap(&insights);

    Ok(AnalysisResult {
        analysis_job_id,
        request_id: job.request_id.clone(),
        area_id: job.area_id.clone(),
        brand,
        competitor,
        insights,
        roadmap,
        generated_at: Utc::now(),
    })
}

fn subject_scores(job: &CollectionJob, subject: Subject) -> Result<SubjectScores, AnalysisError> {
    let subject_id = job.subject_id(subject).to_owned();
    let mut by_source = BTreeMap::new();
    let mut degraded_sources = Vec::new();

    for (&slot, result) in job.results.get(&subject).into_iter().flatten() {
        let Some(payload) = result.payload.as_ref().filter(|_| result.status.is_usable()) else {
            continue;
        };
        if result.kind != slot || payload.kind() != slot {
            return Err(AnalysisError::KindMismatch {
                subject: subject.to_string(),
                slot,
                found: if result.kind == slot {
                    payload.kind()
                } else {
                    result.kind
                },
            });
        }
        by_source.insert(slot, normalize(payload));
        if result.used_fallback {
            degraded_sources.push(slot);
        }
    }

    if by_source.is_empty() {
        return Err(AnalysisError::NoUsableResults {
            subject: subject.to_string(),
            subject_id,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let overall = by_source.values().sum::<f64>() / by_source.len() as f64;
    Ok(SubjectScores {
        subject_id,
        overall,
        by_source,
        degraded_sources,
    })
}

fn impact_for(gap: f64) -> Impact {
    let magnitude = gap.abs();
    if magnitude >= HIGH_IMPACT_GAP {
        Impact::High
    } else if magnitude >= MEDIUM_IMPACT_GAP {
        Impact::Medium
    } else {
        Impact::Low
    }
}

fn rank_insights(brand: &SubjectScores, competitor: &SubjectScores) -> Vec<Insight> {
    let mut gaps: Vec<(SourceKind, f64, f64)> = brand
        .by_source
        .iter()
        .filter_map(|(&kind, &b)| competitor.by_source.get(&kind).map(|&c| (kind, b, c)))
        .collect();
    gaps.sort_by(|a, b| {
        (b.1 - b.2)
            .abs()
            .total_cmp(&(a.1 - a.2).abs())
            .then_with(|| a.0.cmp(&b.0))
    });

    gaps.into_iter()
        .zip(1u32..)
        .map(|((kind, b, c), rank)| {
            let gap = b - c;
            let label = kind.label();
            let title = if gap < 0.0 {
                format!("{} trails {} on {label}", brand.subject_id, competitor.subject_id)
            } else if gap > 0.0 {
                format!("{} leads {} on {label}", brand.subject_id, competitor.subject_id)
            } else {
                format!("{} and {} are level on {label}", brand.subject_id, competitor.subject_id)
            };
            let mut detail =
                format!("Brand scores {b:.1} against {c:.1} for the competitor ({gap:+.1} points).");
            if brand.degraded_sources.contains(&kind) || competitor.degraded_sources.contains(&kind)
            {
                detail.push_str(" Based partly on fallback data.");
            }
            Insight {
                rank,
                source: kind,
                title,
                detail,
                impact: impact_for(gap),
                gap,
            }
        })
        .collect()
}

fn initiative_for(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::News => "Run a press and thought-leadership campaign to lift news coverage",
        SourceKind::SocialMedia => "Increase community engagement and respond to social feedback",
        SourceKind::EmployerReviews => "Address employee feedback themes and employer branding",
        SourceKind::WebsiteQuality => "Improve site performance, metadata and mobile readiness",
    }
}

fn build_roadmap(insights: &[Insight]) -> Vec<RoadmapItem> {
    let mut deficits: Vec<&Insight> = insights.iter().filter(|i| i.gap < 0.0).collect();
    deficits.sort_by(|a, b| a.gap.total_cmp(&b.gap).then_with(|| a.source.cmp(&b.source)));

    let mut roadmap: Vec<RoadmapItem> = deficits
        .into_iter()
        .enumerate()
        .map(|(i, insight)| RoadmapItem {
            quarter: Quarter::ALL[i.min(Quarter::ALL.len() - 1)],
            source: insight.source,
            initiative: initiative_for(insight.source).to_string(),
            impact: insight.impact,
        })
        .collect();

    let strongest = insights
        .iter()
        .filter(|i| i.gap > 0.0)
        .max_by(|a, b| a.gap.total_cmp(&b.gap));
    if let Some(lead) = strongest {
        roadmap.push(RoadmapItem {
            quarter: Quarter::Q4,
            source: lead.source,
            initiative: format!("Maintain the lead in {}", lead.source.label()),
            impact: Impact::Low,
        });
    }

    roadmap
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivalscope_core::{ComparisonRequest, SourceResult};

    fn news(sentiment: f64) -> SourcePayload {
        SourcePayload::News {
            sentiment,
            article_count: 10,
            headlines: vec![],
        }
    }

    fn website(score: f64) -> SourcePayload {
        SourcePayload::WebsiteQuality {
            quality_score: score,
            response_ms: 200,
            https: true,
            page_bytes: 1000,
            has_title: true,
            has_meta_description: true,
            has_viewport: true,
        }
    }

    fn reviews(rating: f64, recommend_pct: f64) -> SourcePayload {
        SourcePayload::EmployerReviews {
            rating,
            review_count: 50,
            recommend_pct,
        }
    }

    fn job_with(sources: &[&str]) -> CollectionJob {
        let sources: Vec<String> = sources.iter().map(ToString::to_string).collect();
        let request = ComparisonRequest::new("req-1", "acme", "globex", "us", Some(&sources))
            .expect("valid request");
        CollectionJob::new(Uuid::new_v4(), &request)
    }

    #[test]
    fn normalize_maps_payloads_onto_0_100() {
        assert!((normalize(&news(-1.0))).abs() < 1e-9);
        assert!((normalize(&news(1.0)) - 100.0).abs() < 1e-9);
        assert!((normalize(&reviews(5.0, 100.0)) - 100.0).abs() < 1e-9);
        assert!((normalize(&website(140.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn insights_rank_by_absolute_gap_and_roadmap_orders_deficits() {
        let mut job = job_with(&["news", "website", "reviews"]);
        job.record(Subject::Brand, SourceResult::ok(news(0.0))); // 50
        job.record(Subject::Competitor, SourceResult::ok(news(0.6))); // 80
        job.record(Subject::Brand, SourceResult::ok(website(60.0)));
        job.record(Subject::Competitor, SourceResult::ok(website(70.0)));
        job.record(Subject::Brand, SourceResult::ok(reviews(5.0, 100.0))); // 100
        job.record(Subject::Competitor, SourceResult::ok(reviews(2.5, 50.0))); // 50
        assert_eq!(job.status, JobStatus::Completed);

        let result = analyze(Uuid::new_v4(), &job).expect("analysis");

        let order: Vec<SourceKind> = result.insights.iter().map(|i| i.source).collect();
        assert_eq!(
            order,
            [
                SourceKind::EmployerReviews,
                SourceKind::News,
                SourceKind::WebsiteQuality
            ]
        );
        assert_eq!(result.insights[0].rank, 1);
        assert_eq!(result.insights[0].impact, Impact::High);
        assert_eq!(result.insights[2].impact, Impact::Medium);

        let roadmap: Vec<(Quarter, SourceKind)> =
            result.roadmap.iter().map(|r| (r.quarter, r.source)).collect();
        assert_eq!(
            roadmap,
            [
                (Quarter::Q1, SourceKind::News),
                (Quarter::Q2, SourceKind::WebsiteQuality),
                (Quarter::Q4, SourceKind::EmployerReviews),
            ]
        );
        assert!((result.brand.overall - 70.0).abs() < 1e-9);
    }

    #[test]
    fn degraded_sources_are_flagged() {
        let mut job = job_with(&["news"]);
        job.record(Subject::Brand, SourceResult::degraded(news(0.1), "upstream down"));
        job.record(Subject::Competitor, SourceResult::ok(news(0.1)));

        let result = analyze(Uuid::new_v4(), &job).expect("analysis");
        assert_eq!(result.brand.degraded_sources, [SourceKind::News]);
        assert!(result.competitor.degraded_sources.is_empty());
        assert!(result.insights[0].detail.contains("fallback"));
        assert!(result.roadmap.is_empty(), "level scores need no initiative");
    }

    #[test]
    fn failed_sources_are_left_out_of_the_mean() {
        let mut job = job_with(&["news", "website"]);
        job.record(Subject::Brand, SourceResult::ok(news(0.0)));
        job.record(
            Subject::Brand,
            SourceResult::failed(SourceKind::WebsiteQuality, "bad id"),
        );
        job.record(Subject::Competitor, SourceResult::ok(news(0.0)));
        job.record(Subject::Competitor, SourceResult::ok(website(90.0)));

        let result = analyze(Uuid::new_v4(), &job).expect("analysis");
        assert_eq!(result.brand.by_source.len(), 1);
        assert_eq!(result.insights.len(), 1, "only shared sources are compared");
    }

    #[test]
    fn running_job_is_rejected() {
        let job = job_with(&["news"]);
        assert!(matches!(
            analyze(Uuid::new_v4(), &job),
            Err(AnalysisError::NotCompleted { .. })
        ));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut job = job_with(&["news"]);
        job.record(Subject::Brand, SourceResult::ok(news(0.2)));
        job.record(Subject::Competitor, SourceResult::ok(news(0.2)));
        let slot = job
            .results
            .get_mut(&Subject::Competitor)
            .and_then(|m| m.get_mut(&SourceKind::News))
            .expect("competitor news result");
        slot.payload = Some(website(50.0));

        assert!(matches!(
            analyze(Uuid::new_v4(), &job),
            Err(AnalysisError::KindMismatch {
                slot: SourceKind::News,
                found: SourceKind::WebsiteQuality,
                ..
            })
        ));
    }

    #[test]
    fn subject_without_usable_results_is_rejected() {
        let mut job = job_with(&["news"]);
        job.record(Subject::Brand, SourceResult::ok(news(0.2)));
        job.record(Subject::Competitor, SourceResult::ok(news(0.2)));
        // Corrupt the snapshot after the fact.
        if let Some(results) = job.results.get_mut(&Subject::Competitor) {
            results.clear();
        }
        assert!(matches!(
            analyze(Uuid::new_v4(), &job),
            Err(AnalysisError::NoUsableResults { .. })
        ));
    }
}
