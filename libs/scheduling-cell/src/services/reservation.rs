// libs/scheduling-cell/src/services/reservation.rs
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::models::{ReservationOutcome, ReservationRecord, ReservationStatus, SchedulingError, Slot};
use crate::services::schedule_store::ScheduleStore;

/// Commits slot selections against the shared schedule. The availability
/// check and the booked flip happen under one write lock in the store, so a
/// slot taken between search and commit surfaces as a conflict here rather
/// than as a double booking.
pub struct ReservationService {
    store: Arc<ScheduleStore>,
}

impl ReservationService {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        Self { store }
    }

    pub async fn commit(
        &self,
        slot: &Slot,
        patient_name: &str,
    ) -> Result<ReservationOutcome, SchedulingError> {
        if patient_name.trim().is_empty() {
            return Err(SchedulingError::ValidationError(
                "Patient name is required to reserve a slot".to_string(),
            ));
        }
        if slot.unit_ids.is_empty() {
            return Err(SchedulingError::ValidationError(
                "Slot has no underlying schedule units".to_string(),
            ));
        }

        match self.store.book_units(&slot.unit_ids).await {
            Ok(()) => {
                let record = ReservationRecord {
                    reservation_id: generate_reservation_id(),
                    patient_name: patient_name.trim().to_string(),
                    doctor_name: slot.doctor_name.clone(),
                    date: slot.date,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    duration_minutes: slot.required_duration_minutes,
                    reserved_at: Utc::now(),
                    status: ReservationStatus::Reserved,
                };
                info!(
                    "Reserved {} for {} with {} on {}",
                    record.reservation_id,
                    record.patient_name,
                    record.doctor_name,
                    record.date.format("%m/%d/%Y")
                );
                Ok(ReservationOutcome::Confirmed(record))
            }
            Err(reason) => {
                warn!("Reservation conflict: {}", reason);
                Ok(ReservationOutcome::Conflict { reason })
            }
        }
    }
}

fn generate_reservation_id() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("RES-{}-{}", stamp, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AvailabilityStatus, ScheduleUnit, SlotComposition};
    use chrono::{Duration, NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn seeded_units(count: usize) -> Vec<ScheduleUnit> {
        let date = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        (0..count)
            .map(|i| {
                let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap()
                    + Duration::minutes(30 * i as i64);
                ScheduleUnit {
                    id: Uuid::new_v4(),
                    doctor_id: "D001".to_string(),
                    doctor_name: "Dr. Johnson".to_string(),
                    specialty: "Family Medicine".to_string(),
                    date,
                    start_time: start,
                    end_time: start + Duration::minutes(30),
                    status: AvailabilityStatus::Available,
                }
            })
            .collect()
    }

    fn slot_over(units: &[ScheduleUnit]) -> Slot {
        let first = &units[0];
        let last = &units[units.len() - 1];
        Slot {
            doctor_id: first.doctor_id.clone(),
            doctor_name: first.doctor_name.clone(),
            specialty: first.specialty.clone(),
            date: first.date,
            start_time: first.start_time,
            end_time: last.end_time,
            actual_duration_minutes: 30 * units.len() as i64,
            required_duration_minutes: 30 * units.len() as i64,
            composition: if units.len() == 1 {
                SlotComposition::Single
            } else {
                SlotComposition::Consecutive
            },
            rank_score: 0.0,
            unit_ids: units.iter().map(|u| u.id).collect(),
        }
    }

    #[tokio::test]
    async fn commit_marks_every_underlying_unit_booked() {
        let units = seeded_units(2);
        let ids: Vec<Uuid> = units.iter().map(|u| u.id).collect();
        let slot = slot_over(&units);
        let store = Arc::new(ScheduleStore::seeded(units));
        let service = ReservationService::new(store.clone());

        let outcome = service.commit(&slot, "Sarah Mitchell").await.unwrap();
        let record = match outcome {
            ReservationOutcome::Confirmed(record) => record,
            ReservationOutcome::Conflict { reason } => panic!("unexpected conflict: {reason}"),
        };
        assert!(record.reservation_id.starts_with("RES-"));
        assert_eq!(record.status, ReservationStatus::Reserved);

        for id in ids {
            assert_eq!(
                store.unit_status(id).await,
                Some(AvailabilityStatus::Booked)
            );
        }
    }

    #[tokio::test]
    async fn second_commit_on_same_slot_conflicts() {
        let units = seeded_units(1);
        let slot = slot_over(&units);
        let store = Arc::new(ScheduleStore::seeded(units));
        let service = ReservationService::new(store);

        let first = service.commit(&slot, "Sarah Mitchell").await.unwrap();
        assert!(matches!(first, ReservationOutcome::Confirmed(_)));

        let second = service.commit(&slot, "Michael Chen").await.unwrap();
        match second {
            ReservationOutcome::Conflict { reason } => {
                assert!(reason.contains("no longer available"));
            }
            ReservationOutcome::Confirmed(_) => panic!("double booking must not succeed"),
        }
    }

    #[tokio::test]
    async fn partial_conflict_leaves_all_units_untouched() {
        let mut units = seeded_units(2);
        units[1].status = AvailabilityStatus::Booked;
        let first_id = units[0].id;
        let slot = slot_over(&units);
        let store = Arc::new(ScheduleStore::seeded(units));
        let service = ReservationService::new(store.clone());

        let outcome = service.commit(&slot, "Sarah Mitchell").await.unwrap();
        assert!(matches!(outcome, ReservationOutcome::Conflict { .. }));
        // The still-available unit must not have been flipped.
        assert_eq!(
            store.unit_status(first_id).await,
            Some(AvailabilityStatus::Available)
        );
    }

    #[tokio::test]
    async fn concurrent_commits_yield_one_confirmation() {
        let units = seeded_units(1);
        let slot = slot_over(&units);
        let store = Arc::new(ScheduleStore::seeded(units));
        let service = Arc::new(ReservationService::new(store));

        let mut handles = Vec::new();
        for name in ["Sarah Mitchell", "Michael Chen", "Ana Reyes"] {
            let service = service.clone();
            let slot = slot.clone();
            handles.push(tokio::spawn(async move {
                service.commit(&slot, name).await.unwrap()
            }));
        }

        let mut confirmed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ReservationOutcome::Confirmed(_)) {
                confirmed += 1;
            }
        }
        assert_eq!(confirmed, 1);
    }

    #[tokio::test]
    async fn blank_patient_name_is_rejected() {
        let units = seeded_units(1);
        let slot = slot_over(&units);
        let service = ReservationService::new(Arc::new(ScheduleStore::seeded(units)));

        let err = service.commit(&slot, "   ").await.unwrap_err();
        assert!(matches!(err, SchedulingError::ValidationError(_)));
    }
}
