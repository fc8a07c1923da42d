// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// The atomic bookable granule of one doctor's day. Immutable once generated
/// except for the available -> booked transition performed by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUnit {
    pub id: Uuid,
    pub doctor_id: String,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AvailabilityStatus,
}

impl ScheduleUnit {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Booked,
    Blocked,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityStatus::Available => write!(f, "available"),
            AvailabilityStatus::Booked => write!(f, "booked"),
            AvailabilityStatus::Blocked => write!(f, "blocked"),
        }
    }
}

// ==============================================================================
// SLOT SEARCH MODELS
// ==============================================================================

/// A candidate appointment window, possibly consolidated from several
/// contiguous schedule units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: String,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub actual_duration_minutes: i64,
    pub required_duration_minutes: i64,
    pub composition: SlotComposition,
    pub rank_score: f64,
    /// Underlying unit ids the ledger must flip to booked on commit.
    pub unit_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotComposition {
    Single,
    Consecutive,
}

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub doctor_preference: Option<String>,
    pub duration_minutes: i64,
    pub preferred_date: Option<NaiveDate>,
    pub max_days_ahead: i64,
    /// Search-horizon anchor; defaults to the current date when unset.
    pub today: Option<NaiveDate>,
}

impl SlotQuery {
    pub fn new(duration_minutes: i64) -> Self {
        Self {
            doctor_preference: None,
            duration_minutes,
            preferred_date: None,
            max_days_ahead: 14,
            today: None,
        }
    }

    pub fn with_preference(mut self, preference: impl Into<String>) -> Self {
        let preference = preference.into();
        if !preference.trim().is_empty() {
            self.doctor_preference = Some(preference);
        }
        self
    }
}

// ==============================================================================
// RESERVATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub reservation_id: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub reserved_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Cancelled,
}

/// Outcome of a commit attempt. A slot taken between search and commit is an
/// expected, recoverable condition, not an error.
#[derive(Debug, Clone)]
pub enum ReservationOutcome {
    Confirmed(ReservationRecord),
    Conflict { reason: String },
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Schedule source error: {0}")]
    ScheduleSourceError(String),
}
