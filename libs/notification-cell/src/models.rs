// libs/notification-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// CONFIRMATION MODELS
// ==============================================================================

/// Everything the confirmation message and email need about a finished
/// booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationNotice {
    pub confirmation_id: String,
    pub booking_id: String,
    pub patient_name: String,
    pub patient_email: Option<String>,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    pub requires_forms: bool,
}

// ==============================================================================
// REMINDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    Email,
    Sms,
}

impl fmt::Display for ReminderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderMethod::Email => write!(f, "email"),
            ReminderMethod::Sms => write!(f, "sms"),
        }
    }
}

/// One entry of the fixed pre-appointment reminder schedule. `send_at` is the
/// computed future send time; dispatch at that time belongs to an external
/// queue, not this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub confirmation_id: String,
    pub send_at: DateTime<Utc>,
    pub hours_before: i64,
    pub method: ReminderMethod,
    /// Whether the reminder asks the patient to confirm intake forms are
    /// done.
    pub checks_forms: bool,
}

// ==============================================================================
// EXPORT MODELS
// ==============================================================================

/// Flat per-booking record for the administrative export sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSummary {
    pub confirmation_id: String,
    pub booking_id: String,
    pub patient_name: String,
    pub patient_type: String,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    pub insurance_carrier: Option<String>,
    pub estimated_revenue: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}
