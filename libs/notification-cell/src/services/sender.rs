// libs/notification-cell/src/services/sender.rs
use async_trait::async_trait;
use tracing::info;

use crate::models::{ConfirmationNotice, Reminder};

/// Outbound confirmation and reminder delivery. Best-effort by contract; a
/// `false` return means delivery did not happen and the caller logs and moves
/// on.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_confirmation(&self, notice: &ConfirmationNotice) -> bool;

    /// Registers the computed reminder schedule and returns how many entries
    /// were accepted.
    async fn schedule_reminders(&self, reminders: &[Reminder]) -> usize;
}

/// Sender that records deliveries in the application log. Stands in for a
/// real email/SMS gateway.
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send_confirmation(&self, notice: &ConfirmationNotice) -> bool {
        info!(
            "Confirmation {} sent to {} for {} on {} at {}",
            notice.confirmation_id,
            notice.patient_email.as_deref().unwrap_or("patient on file"),
            notice.doctor_name,
            notice.date.format("%m/%d/%Y"),
            notice.start_time.format("%H:%M")
        );
        true
    }

    async fn schedule_reminders(&self, reminders: &[Reminder]) -> usize {
        for reminder in reminders {
            info!(
                "Reminder for {} via {} at {} ({}h before, form check: {})",
                reminder.confirmation_id,
                reminder.method,
                reminder.send_at.format("%Y-%m-%d %H:%M UTC"),
                reminder.hours_before,
                reminder.checks_forms
            );
        }
        reminders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};

    #[tokio::test]
    async fn logging_sender_accepts_everything() {
        let sender = LoggingNotificationSender;
        let notice = ConfirmationNotice {
            confirmation_id: "CONF-20250910090000-1234".to_string(),
            booking_id: "RES-20250910090000-5678".to_string(),
            patient_name: "Sarah Mitchell".to_string(),
            patient_email: Some("sarah@example.com".to_string()),
            doctor_name: "Dr. Johnson".to_string(),
            specialty: "Family Medicine".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 60,
            requires_forms: true,
        };
        assert!(sender.send_confirmation(&notice).await);

        let reminders = vec![Reminder {
            confirmation_id: notice.confirmation_id.clone(),
            send_at: Utc::now(),
            hours_before: 24,
            method: crate::models::ReminderMethod::Email,
            checks_forms: false,
        }];
        assert_eq!(sender.schedule_reminders(&reminders).await, 1);
    }
}
