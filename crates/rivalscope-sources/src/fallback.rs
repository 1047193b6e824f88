//! Fallback values substituted when a live fetch cannot be completed.
//!
//! Preference order: the last live payload seen for the same
//! (kind, subject, area), then a deterministic synthetic payload derived from
//! a SHA-256 of the same key. Synthetic values sit in a neutral band so a
//! degraded source never dominates the comparison.

use std::collections::HashMap;
use std::sync::Mutex;

use rivalscope_core::{SourceKind, SourcePayload};
use sha2::{Digest, Sha256};

type CacheKey = (SourceKind, String, String);

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CacheKey, (SourcePayload, u64)>,
    clock: u64,
}

/// Last-known-good payloads, private to one collector. Holds at most
/// `capacity` keys and evicts the least recently used one when full.
#[derive(Debug)]
pub(crate) struct FallbackCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FallbackCache {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn store(&self, subject_id: &str, area_id: &str, payload: &SourcePayload) {
        let key = (payload.kind(), subject_id.to_string(), area_id.to_string());
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.clock += 1;
        let tick = entries.clock;
        if !entries.map.contains_key(&key) && entries.map.len() >= self.capacity {
            let oldest = entries
                .map
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.map.remove(&oldest);
            }
        }
        entries.map.insert(key, (payload.clone(), tick));
    }

    pub(crate) fn get(
        &self,
        kind: SourceKind,
        subject_id: &str,
        area_id: &str,
    ) -> Option<SourcePayload> {
        let key = (kind, subject_id.to_string(), area_id.to_string());
        let mut entries = self.entries.lock().ok()?;
        entries.clock += 1;
        let tick = entries.clock;
        let (payload, used) = entries.map.get_mut(&key)?;
        *used = tick;
        Some(payload.clone())
    }
}

/// Deterministic stand-in payload for `kind`.
#[must_use]
pub fn synthetic_payload(kind: SourceKind, subject_id: &str, area_id: &str) -> SourcePayload {
    let digest = Sha256::digest(format!("{kind}:{subject_id}:{area_id}").as_bytes());
    // Uniform value in [0, 1] taken from two digest bytes.
    let unit = |i: usize| f64::from(u16::from_be_bytes([digest[i], digest[i + 1]])) / 65_535.0;
    let small = |i: usize, span: u8| u32::from(digest[i] % span);

    match kind {
        SourceKind::News => SourcePayload::News {
            sentiment: unit(0) * 0.4 - 0.2,
            article_count: 5 + small(2, 20),
            headlines: Vec::new(),
        },
        SourceKind::SocialMedia => SourcePayload::SocialMedia {
            sentiment: unit(3) * 0.4 - 0.2,
            mention_count: 10 + small(5, 90),
            engagement: 100 + u64::from(u16::from_be_bytes([digest[6], digest[7]]) % 900),
        },
        SourceKind::EmployerReviews => SourcePayload::EmployerReviews {
            rating: 3.0 + unit(8) * 1.0,
            review_count: 20 + small(10, 180),
            recommend_pct: 55.0 + unit(11) * 20.0,
        },
        SourceKind::WebsiteQuality => SourcePayload::WebsiteQuality {
            quality_score: 50.0 + unit(13) * 20.0,
            response_ms: 400 + u64::from(u16::from_be_bytes([digest[15], digest[16]]) % 800),
            https: true,
            page_bytes: 0,
            has_title: true,
            has_meta_description: digest[17] % 2 == 0,
            has_viewport: true,
        },
    }
}
