// libs/scheduling-cell/src/services/availability.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Timelike, Utc};
use rand::Rng;
use tracing::debug;

use crate::models::{AvailabilityStatus, ScheduleUnit, Slot, SlotComposition, SlotQuery};
use crate::services::schedule_store::ScheduleStore;

const MAX_RESULTS: usize = 10;
const MORNING_STANDARD_BONUS: f64 = 20.0;
const EXACT_DURATION_BONUS: f64 = 15.0;
const NEAR_DURATION_BONUS: f64 = 10.0;
const SINGLE_UNIT_BONUS: f64 = 10.0;
const STANDARD_VISIT_MINUTES: i64 = 60;

/// Searches the live schedule for bookable appointment windows, consolidating
/// contiguous units when a visit needs more time than one unit offers.
pub struct SlotSearchService {
    store: Arc<ScheduleStore>,
    /// Small random tie-breaker added to each score so equally ranked slots
    /// rotate across searches. Disabled for deterministic ranking.
    jitter: bool,
}

impl SlotSearchService {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        Self {
            store,
            jitter: true,
        }
    }

    pub fn without_jitter(store: Arc<ScheduleStore>) -> Self {
        Self {
            store,
            jitter: false,
        }
    }

    /// Find up to ten ranked slots matching the query. An empty result is a
    /// normal outcome, not an error.
    pub async fn find_slots(&self, query: &SlotQuery) -> Vec<Slot> {
        let units = self.store.snapshot().await;
        let available: Vec<ScheduleUnit> = units
            .into_iter()
            .filter(|u| u.status == AvailabilityStatus::Available)
            .collect();

        let preferred = apply_doctor_preference(available, query.doctor_preference.as_deref());
        let in_window = apply_date_window(preferred, query);

        // Deterministic grouping order: by doctor, then day, then start time.
        let mut grouped: BTreeMap<(String, chrono::NaiveDate), Vec<ScheduleUnit>> = BTreeMap::new();
        for unit in in_window {
            grouped
                .entry((unit.doctor_id.clone(), unit.date))
                .or_default()
                .push(unit);
        }

        let mut slots = Vec::new();
        for group in grouped.values_mut() {
            group.sort_by_key(|u| u.start_time);
            slots.extend(slots_from_day(group, query.duration_minutes));
        }

        for slot in &mut slots {
            slot.rank_score = self.score(slot);
        }

        slots.sort_by(|a, b| {
            b.rank_score
                .partial_cmp(&a.rank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.date.cmp(&b.date))
                .then(a.start_time.cmp(&b.start_time))
        });
        slots.truncate(MAX_RESULTS);

        debug!(
            "Slot search for {} minutes returned {} candidates",
            query.duration_minutes,
            slots.len()
        );
        slots
    }

    fn score(&self, slot: &Slot) -> f64 {
        let mut score = 0.0;
        let start_hour = slot.start_time.hour() as i64;

        // Morning standard visits are the easiest to fill.
        if start_hour < 12 && slot.required_duration_minutes == STANDARD_VISIT_MINUTES {
            score += MORNING_STANDARD_BONUS;
        }

        // Earlier in the day ranks higher.
        score += (24 - start_hour) as f64;

        if slot.actual_duration_minutes == slot.required_duration_minutes {
            score += EXACT_DURATION_BONUS;
        } else if slot.actual_duration_minutes < slot.required_duration_minutes + 30 {
            score += NEAR_DURATION_BONUS;
        }

        if slot.composition == SlotComposition::Single {
            score += SINGLE_UNIT_BONUS;
        }

        if self.jitter {
            score += rand::thread_rng().gen_range(0.0..5.0);
        }

        score
    }
}

fn apply_doctor_preference(units: Vec<ScheduleUnit>, preference: Option<&str>) -> Vec<ScheduleUnit> {
    let Some(preference) = preference else {
        return units;
    };
    let needle = preference.trim().to_lowercase();
    if needle.is_empty() {
        return units;
    }

    let by_name: Vec<ScheduleUnit> = units
        .iter()
        .filter(|u| u.doctor_name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if !by_name.is_empty() {
        return by_name;
    }

    let by_specialty: Vec<ScheduleUnit> = units
        .iter()
        .filter(|u| u.specialty.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if !by_specialty.is_empty() {
        return by_specialty;
    }

    // No doctor matched the preference; offer the full schedule instead of
    // nothing.
    units
}

fn apply_date_window(units: Vec<ScheduleUnit>, query: &SlotQuery) -> Vec<ScheduleUnit> {
    if let Some(preferred) = query.preferred_date {
        let on_date: Vec<ScheduleUnit> = units
            .iter()
            .filter(|u| u.date == preferred)
            .cloned()
            .collect();
        if !on_date.is_empty() {
            return on_date;
        }
        // Nothing on the requested day; fall through to the horizon instead
        // of returning nothing.
    }

    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let horizon = today + Duration::days(query.max_days_ahead);
    units
        .into_iter()
        .filter(|u| u.date >= today && u.date <= horizon)
        .collect()
}

/// Build candidate slots from one doctor's units for one day, sorted by start
/// time. Units long enough on their own become single slots; longer visits may
/// also be covered by runs of back-to-back units.
fn slots_from_day(units: &[ScheduleUnit], required_minutes: i64) -> Vec<Slot> {
    let mut slots = Vec::new();

    for unit in units {
        if unit.duration_minutes() >= required_minutes {
            slots.push(slot_from_units(
                std::slice::from_ref(unit),
                required_minutes,
                SlotComposition::Single,
            ));
        }
    }

    // Consolidation only applies past the base visit length; a 30-minute
    // visit always fits a single unit.
    if required_minutes > 30 {
        for start in 0..units.len() {
            if units[start].duration_minutes() >= required_minutes {
                continue;
            }
            let mut run = vec![&units[start]];
            let mut total = units[start].duration_minutes();
            let mut cursor = start;

            while total < required_minutes && cursor + 1 < units.len() {
                let next = &units[cursor + 1];
                if next.start_time != units[cursor].end_time {
                    break;
                }
                run.push(next);
                total += next.duration_minutes();
                cursor += 1;
            }

            if total >= required_minutes {
                let owned: Vec<ScheduleUnit> = run.into_iter().cloned().collect();
                slots.push(slot_from_units(
                    &owned,
                    required_minutes,
                    SlotComposition::Consecutive,
                ));
            }
        }
    }

    slots
}

fn slot_from_units(
    units: &[ScheduleUnit],
    required_minutes: i64,
    composition: SlotComposition,
) -> Slot {
    let first = &units[0];
    let last = &units[units.len() - 1];
    Slot {
        doctor_id: first.doctor_id.clone(),
        doctor_name: first.doctor_name.clone(),
        specialty: first.specialty.clone(),
        date: first.date,
        start_time: first.start_time,
        end_time: last.end_time,
        actual_duration_minutes: units.iter().map(|u| u.duration_minutes()).sum(),
        required_duration_minutes: required_minutes,
        composition,
        rank_score: 0.0,
        unit_ids: units.iter().map(|u| u.id).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn unit(
        doctor_id: &str,
        doctor_name: &str,
        specialty: &str,
        date: (i32, u32, u32),
        start: (u32, u32),
        minutes: i64,
        status: AvailabilityStatus,
    ) -> ScheduleUnit {
        let start_time = NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap();
        ScheduleUnit {
            id: Uuid::new_v4(),
            doctor_id: doctor_id.to_string(),
            doctor_name: doctor_name.to_string(),
            specialty: specialty.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            start_time,
            end_time: start_time + Duration::minutes(minutes),
            status,
        }
    }

    fn anchored_query(duration: i64) -> SlotQuery {
        let mut query = SlotQuery::new(duration);
        query.today = NaiveDate::from_ymd_opt(2025, 9, 8);
        query
    }

    async fn search(units: Vec<ScheduleUnit>, query: &SlotQuery) -> Vec<Slot> {
        let store = Arc::new(ScheduleStore::seeded(units));
        SlotSearchService::without_jitter(store).find_slots(query).await
    }

    #[tokio::test]
    async fn booked_and_blocked_units_never_surface() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 30, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 30), 30, AvailabilityStatus::Booked),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (10, 0), 30, AvailabilityStatus::Blocked),
        ];

        let slots = search(units, &anchored_query(30)).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn consolidates_back_to_back_units_for_long_visits() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 30, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 30), 30, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert_eq!(slots.len(), 1);
        let slot = &slots[0];
        assert_eq!(slot.composition, SlotComposition::Consecutive);
        assert_eq!(slot.actual_duration_minutes, 60);
        assert_eq!(slot.unit_ids.len(), 2);
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(slot.end_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn gap_between_units_blocks_consolidation() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 30, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (10, 0), 30, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn run_stops_at_minimal_covering_prefix() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 30, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 30), 30, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (10, 0), 30, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        // Two covering runs start at 9:00 and 9:30; neither swallows the
        // whole morning.
        assert_eq!(slots.len(), 2);
        for slot in &slots {
            assert_eq!(slot.actual_duration_minutes, 60);
            assert_eq!(slot.unit_ids.len(), 2);
        }
    }

    #[tokio::test]
    async fn doctor_preference_matches_name_then_specialty() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
            unit("D002", "Dr. Smith", "Cardiology", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
        ];

        let by_name = search(units.clone(), &anchored_query(60).with_preference("johnson")).await;
        assert!(by_name.iter().all(|s| s.doctor_name == "Dr. Johnson"));

        let by_specialty =
            search(units.clone(), &anchored_query(60).with_preference("cardiology")).await;
        assert!(by_specialty.iter().all(|s| s.doctor_name == "Dr. Smith"));

        // Unknown preference falls back to the full schedule.
        let fallback = search(units, &anchored_query(60).with_preference("Dr. Nobody")).await;
        assert_eq!(fallback.len(), 2);
    }

    #[tokio::test]
    async fn preferred_date_overrides_horizon() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 12), (9, 0), 60, AvailabilityStatus::Available),
        ];

        let mut query = anchored_query(60);
        query.preferred_date = NaiveDate::from_ymd_opt(2025, 9, 12);
        let slots = search(units, &query).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].date, NaiveDate::from_ymd_opt(2025, 9, 12).unwrap());
    }

    #[tokio::test]
    async fn preferred_date_with_no_openings_falls_back_to_horizon() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
        ];

        let mut query = anchored_query(60);
        query.preferred_date = NaiveDate::from_ymd_opt(2025, 9, 12);
        let slots = search(units, &query).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].date, NaiveDate::from_ymd_opt(2025, 9, 10).unwrap());
    }

    #[tokio::test]
    async fn units_past_the_horizon_are_excluded() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 10, 20), (9, 0), 60, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].date, NaiveDate::from_ymd_opt(2025, 9, 10).unwrap());
    }

    #[tokio::test]
    async fn morning_standard_visits_outrank_afternoon_ones() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (14, 0), 60, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(slots[0].rank_score > slots[1].rank_score);
    }

    #[tokio::test]
    async fn morning_bonus_applies_to_oversized_openings_for_standard_visits() {
        let units = vec![
            // Oversized morning opening.
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 90, AvailabilityStatus::Available),
            // Exact afternoon fit.
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (14, 0), 60, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert_eq!(slots.len(), 2);
        // The morning opening keeps the standard-visit bonus even though it
        // is longer than the visit needs.
        assert_eq!(slots[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(slots[0].rank_score > slots[1].rank_score);
    }

    #[tokio::test]
    async fn exact_fit_single_unit_outranks_oversized_and_consolidated() {
        let units = vec![
            // Exact 60-minute single unit.
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
            // Oversized 90-minute unit, same hour, different doctor.
            unit("D002", "Dr. Smith", "Family Medicine", (2025, 9, 10), (9, 0), 90, AvailabilityStatus::Available),
        ];

        let slots = search(units, &anchored_query(60)).await;
        assert_eq!(slots[0].doctor_name, "Dr. Johnson");
        assert_eq!(slots[0].actual_duration_minutes, 60);
    }

    #[tokio::test]
    async fn results_cap_at_ten() {
        let mut units = Vec::new();
        for day in 9..=13 {
            for hour in [8, 9, 10, 11] {
                units.push(unit(
                    "D001",
                    "Dr. Johnson",
                    "Family Medicine",
                    (2025, 9, day),
                    (hour, 0),
                    30,
                    AvailabilityStatus::Available,
                ));
            }
        }

        let slots = search(units, &anchored_query(30)).await;
        assert_eq!(slots.len(), 10);
    }

    #[tokio::test]
    async fn deterministic_ranking_without_jitter() {
        let units = vec![
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (9, 0), 60, AvailabilityStatus::Available),
            unit("D001", "Dr. Johnson", "Family Medicine", (2025, 9, 10), (10, 0), 60, AvailabilityStatus::Available),
            unit("D002", "Dr. Smith", "Cardiology", (2025, 9, 11), (8, 0), 60, AvailabilityStatus::Available),
        ];

        let first = search(units.clone(), &anchored_query(60)).await;
        let second = search(units, &anchored_query(60)).await;
        let order = |slots: &[Slot]| -> Vec<(chrono::NaiveDate, NaiveTime)> {
            slots.iter().map(|s| (s.date, s.start_time)).collect()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn empty_schedule_returns_no_slots() {
        let slots = search(Vec::new(), &anchored_query(30)).await;
        assert!(slots.is_empty());
    }
}
