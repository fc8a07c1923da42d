// libs/patient-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE PATIENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub name: String,
    /// Canonical MM/DD/YYYY.
    pub date_of_birth: String,
    pub phone: String,
    pub email: Option<String>,
    pub patient_type: PatientType,
    pub last_visit: Option<String>,
    pub insurance_carrier: Option<String>,
    pub member_id: Option<String>,
    pub group_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatientType {
    #[default]
    Unknown,
    New,
    Returning,
}

impl fmt::Display for PatientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientType::Unknown => write!(f, "unknown"),
            PatientType::New => write!(f, "new"),
            PatientType::Returning => write!(f, "returning"),
        }
    }
}

// ==============================================================================
// LOOKUP MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct LookupQuery {
    pub name: String,
    pub date_of_birth: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: PatientRecord,
    pub confidence: f64,
    pub match_kind: MatchKind,
    pub name_similarity: f64,
    pub dob_matches: bool,
    pub phone_verified: bool,
}

/// Result of classifying a name + DOB (+ optional phone) query against the
/// patient store. Never an error: an empty or unreadable store classifies
/// the patient as new with confidence 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupOutcome {
    pub is_returning: bool,
    pub confidence: f64,
    pub matched_record: Option<PatientRecord>,
    pub top_candidates: Vec<MatchCandidate>,
}

impl LookupOutcome {
    pub fn new_patient() -> Self {
        Self {
            is_returning: false,
            confidence: 0.0,
            matched_record: None,
            top_candidates: Vec::new(),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Patient store error: {0}")]
    StoreError(String),
}
