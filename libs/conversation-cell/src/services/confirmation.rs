// libs/conversation-cell/src/services/confirmation.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use tracing::debug;

use notification_cell::{Reminder, ReminderMethod};
use patient_cell::PatientType;

// Expected per-visit revenue by specialty, (new, returning).
const REVENUE_TABLE: &[(&str, f64, f64)] = &[
    ("family medicine", 275.0, 150.0),
    ("cardiology", 450.0, 200.0),
    ("dermatology", 350.0, 180.0),
    ("orthopedics", 400.0, 220.0),
    ("internal medicine", 300.0, 160.0),
];
const DEFAULT_REVENUE: (f64, f64) = (300.0, 175.0);

/// Each tier: hours before the appointment, delivery method, whether the
/// message asks the patient to confirm intake forms are done.
const REMINDER_TIERS: &[(i64, ReminderMethod, bool)] = &[
    (24, ReminderMethod::Email, false),
    (4, ReminderMethod::Sms, true),
    (1, ReminderMethod::Sms, false),
];

/// Computes confirmation identifiers, revenue estimates, and the fixed
/// reminder schedule for a finished booking.
pub struct ConfirmationService {
    /// Applies a +/- 10% spread to revenue estimates. Off for deterministic
    /// figures in tests.
    revenue_variation: bool,
}

impl ConfirmationService {
    pub fn new() -> Self {
        Self {
            revenue_variation: true,
        }
    }

    pub fn without_variation() -> Self {
        Self {
            revenue_variation: false,
        }
    }

    pub fn generate_confirmation_id(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
        format!("CONF-{}-{}", stamp, suffix)
    }

    pub fn estimated_revenue(&self, patient_type: PatientType, specialty: &str) -> f64 {
        let key = specialty.trim().to_lowercase();
        let (new_rate, returning_rate) = REVENUE_TABLE
            .iter()
            .find(|(name, _, _)| *name == key)
            .map(|(_, n, r)| (*n, *r))
            .unwrap_or(DEFAULT_REVENUE);

        let base = match patient_type {
            PatientType::Returning => returning_rate,
            PatientType::New | PatientType::Unknown => new_rate,
        };

        let estimate = if self.revenue_variation {
            base * rand::thread_rng().gen_range(0.9..1.1)
        } else {
            base
        };
        (estimate * 100.0).round() / 100.0
    }

    /// Three fixed tiers pinned to the appointment start. Entries that would
    /// already be in the past are still produced; the dispatch queue decides
    /// what to do with them.
    pub fn reminder_schedule(
        &self,
        confirmation_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Vec<Reminder> {
        let appointment_start: DateTime<Utc> = date.and_time(start_time).and_utc();

        let reminders: Vec<Reminder> = REMINDER_TIERS
            .iter()
            .map(|(hours_before, method, checks_forms)| Reminder {
                confirmation_id: confirmation_id.to_string(),
                send_at: appointment_start - Duration::hours(*hours_before),
                hours_before: *hours_before,
                method: *method,
                checks_forms: *checks_forms,
            })
            .collect();

        debug!(
            "Built {} reminders for {}",
            reminders.len(),
            confirmation_id
        );
        reminders
    }
}

impl Default for ConfirmationService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revenue_follows_specialty_and_patient_type() {
        let service = ConfirmationService::without_variation();
        assert_eq!(
            service.estimated_revenue(PatientType::New, "Family Medicine"),
            275.0
        );
        assert_eq!(
            service.estimated_revenue(PatientType::Returning, "Cardiology"),
            200.0
        );
        // Unlisted specialty falls back to the default rates.
        assert_eq!(
            service.estimated_revenue(PatientType::New, "Podiatry"),
            300.0
        );
    }

    #[test]
    fn variation_stays_within_ten_percent() {
        let service = ConfirmationService::new();
        for _ in 0..50 {
            let estimate = service.estimated_revenue(PatientType::New, "Family Medicine");
            assert!((247.5..=302.5).contains(&estimate), "estimate {estimate}");
        }
    }

    #[test]
    fn reminder_tiers_are_24h_email_4h_sms_1h_sms() {
        let service = ConfirmationService::without_variation();
        let date = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let reminders = service.reminder_schedule("CONF-1", date, start);

        assert_eq!(reminders.len(), 3);
        let appointment = date.and_time(start).and_utc();

        assert_eq!(reminders[0].method, ReminderMethod::Email);
        assert!(!reminders[0].checks_forms);
        assert_eq!(reminders[0].send_at, appointment - Duration::hours(24));

        assert_eq!(reminders[1].method, ReminderMethod::Sms);
        assert!(reminders[1].checks_forms);
        assert_eq!(reminders[1].send_at, appointment - Duration::hours(4));

        assert_eq!(reminders[2].method, ReminderMethod::Sms);
        assert!(!reminders[2].checks_forms);
        assert_eq!(reminders[2].send_at, appointment - Duration::hours(1));
    }

    #[test]
    fn confirmation_ids_carry_the_prefix() {
        let service = ConfirmationService::new();
        let id = service.generate_confirmation_id();
        assert!(id.starts_with("CONF-"));
        assert_eq!(id.split('-').count(), 3);
    }
}
