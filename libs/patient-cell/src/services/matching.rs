// libs/patient-cell/src/services/matching.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::{LookupOutcome, LookupQuery, MatchCandidate, MatchKind, PatientRecord};
use crate::services::store::PatientStore;

/// Minimum confidence for a fuzzy candidate to survive ranking.
const FUZZY_FLOOR: f64 = 60.0;
/// Top-ranked candidates at or above this confidence classify the query as returning.
const RETURNING_THRESHOLD: f64 = 85.0;
/// Bonus for a verified phone match, capped at 100 total.
const PHONE_BONUS: f64 = 15.0;

const NAME_WEIGHT: f64 = 0.7;
const DOB_WEIGHT: f64 = 0.3;

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d", "%Y-%m-%d", "%m/%d/%y", "%m-%d-%y",
];

pub struct IdentityMatcherService {
    store: Arc<dyn PatientStore>,
}

impl IdentityMatcherService {
    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self { store }
    }

    /// Classify a query as new-or-returning against the patient store.
    ///
    /// Exact matches (normalized name + DOB both identical) score 100; all
    /// others are scored `0.7 * name_similarity + 0.3 * dob_equality` on a
    /// 0-100 scale, with a +15 bonus for a verified phone. The matcher never
    /// writes to the store; appending a record for a new patient is the
    /// caller's responsibility.
    pub async fn classify(&self, query: &LookupQuery) -> LookupOutcome {
        let records = match self.store.find_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Patient store unreadable, classifying as new: {}", e);
                return LookupOutcome::new_patient();
            }
        };

        if records.is_empty() {
            return LookupOutcome::new_patient();
        }

        let query_name = normalize_name(&query.name);
        let query_dob = normalize_date(&query.date_of_birth);
        let query_phone = query.phone.as_deref().and_then(normalize_phone_opt);

        if query_name.is_empty() || query_dob.is_none() {
            debug!("Lookup query missing usable name or DOB, classifying as new");
            return LookupOutcome::new_patient();
        }
        let query_dob = query_dob.unwrap_or_default();

        let mut candidates: Vec<MatchCandidate> = Vec::new();
        for record in records {
            let record_name = normalize_name(&record.name);
            let record_dob = normalize_date(&record.date_of_birth).unwrap_or_default();

            let name_similarity = name_ratio(&query_name, &record_name);
            let dob_matches = !record_dob.is_empty() && record_dob == query_dob;

            let (match_kind, mut confidence) = if name_similarity >= 100.0 && dob_matches {
                (MatchKind::Exact, 100.0)
            } else {
                let dob_score = if dob_matches { 100.0 } else { 0.0 };
                (
                    MatchKind::Fuzzy,
                    NAME_WEIGHT * name_similarity + DOB_WEIGHT * dob_score,
                )
            };

            if match_kind == MatchKind::Fuzzy && confidence < FUZZY_FLOOR {
                continue;
            }

            let phone_verified = match (&query_phone, normalize_phone_opt(&record.phone)) {
                (Some(q), Some(r)) => q == &r,
                _ => false,
            };
            if phone_verified {
                confidence = (confidence + PHONE_BONUS).min(100.0);
            }

            candidates.push(MatchCandidate {
                record,
                confidence,
                match_kind,
                name_similarity,
                dob_matches,
                phone_verified,
            });
        }

        // Stable sort keeps store iteration order for equal confidences.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(best) = candidates.first().cloned() else {
            return LookupOutcome::new_patient();
        };

        let is_returning = meets_returning_threshold(best.confidence);
        debug!(
            "Best identity match scored {:.1} ({})",
            best.confidence,
            if is_returning { "returning" } else { "new" }
        );

        LookupOutcome {
            is_returning,
            confidence: best.confidence,
            matched_record: is_returning.then(|| best.record.clone()),
            top_candidates: candidates.into_iter().take(3).collect(),
        }
    }
}

pub fn meets_returning_threshold(confidence: f64) -> bool {
    confidence >= RETURNING_THRESHOLD
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize a date string to MM/DD/YYYY; None if no accepted format parses.
pub fn normalize_date(date: &str) -> Option<String> {
    let trimmed = date.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed.format("%m/%d/%Y").to_string());
        }
    }
    None
}

/// Digits only; a leading country-code 1 on an 11-digit number is dropped.
/// Anything that does not come out as 10 digits is treated as absent.
pub fn normalize_phone_opt(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    };
    (digits.len() == 10).then_some(digits)
}

/// Edit-distance similarity ratio on a 0-100 scale, monotonic in distance.
fn name_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}
