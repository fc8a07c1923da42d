// libs/scheduling-cell/src/services/schedule_store.rs
use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AvailabilityStatus, ScheduleUnit};

const TIME_FORMATS: &[&str] = &["%H:%M", "%I:%M %p", "%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Shared store of schedule units. This is the one resource shared across
/// conversation threads; booking goes through `book_units`, which holds the
/// write lock across the full check-then-flip so two threads cannot
/// double-book the same unit.
pub struct ScheduleStore {
    units: RwLock<HashMap<Uuid, ScheduleUnit>>,
}

/// Raw schedule row as persisted. Times and dates are kept as strings so the
/// source may use 24-hour or 12-hour clock forms.
#[derive(Debug, Deserialize)]
struct ScheduleRow {
    doctor_id: String,
    doctor_name: String,
    specialty: String,
    date: String,
    start_time: String,
    end_time: String,
    availability_status: AvailabilityStatus,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
        }
    }

    pub fn seeded(units: Vec<ScheduleUnit>) -> Self {
        Self {
            units: RwLock::new(units.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    /// Load schedule rows from a JSON file. A missing or malformed source
    /// yields an empty store; slot searches against it return no candidates
    /// rather than failing.
    pub fn load_from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                warn!("Schedule source not found at {}", path.display());
                return Self::new();
            }
        };

        let rows: Vec<ScheduleRow> = match serde_json::from_str(&contents) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Malformed schedule source at {}: {}", path.display(), e);
                return Self::new();
            }
        };

        let mut units = Vec::new();
        for row in rows {
            match Self::unit_from_row(row) {
                Some(unit) => units.push(unit),
                None => warn!("Skipping schedule row with unparseable date or time"),
            }
        }
        debug!("Loaded {} schedule units", units.len());
        Self::seeded(units)
    }

    fn unit_from_row(row: ScheduleRow) -> Option<ScheduleUnit> {
        Some(ScheduleUnit {
            id: Uuid::new_v4(),
            doctor_id: row.doctor_id,
            doctor_name: row.doctor_name,
            specialty: row.specialty,
            date: parse_schedule_date(&row.date)?,
            start_time: parse_clock_time(&row.start_time)?,
            end_time: parse_clock_time(&row.end_time)?,
            status: row.availability_status,
        })
    }

    pub async fn snapshot(&self) -> Vec<ScheduleUnit> {
        self.units.read().await.values().cloned().collect()
    }

    /// Atomically flip the given units from available to booked. Either all
    /// units flip or none do; the reason names the first unit found taken.
    pub async fn book_units(&self, unit_ids: &[Uuid]) -> Result<(), String> {
        let mut units = self.units.write().await;

        for id in unit_ids {
            match units.get(id) {
                Some(unit) if unit.status == AvailabilityStatus::Available => {}
                Some(unit) => {
                    return Err(format!(
                        "Time slot {} {} with {} is no longer available",
                        unit.date.format("%m/%d/%Y"),
                        unit.start_time.format("%H:%M"),
                        unit.doctor_name
                    ));
                }
                None => return Err("Selected time slot no longer exists".to_string()),
            }
        }

        for id in unit_ids {
            if let Some(unit) = units.get_mut(id) {
                unit.status = AvailabilityStatus::Booked;
            }
        }

        Ok(())
    }

    pub async fn unit_status(&self, unit_id: Uuid) -> Option<AvailabilityStatus> {
        self.units.read().await.get(&unit_id).map(|u| u.status)
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts 24-hour `HH:MM`, 12-hour `HH:MM AM/PM`, and `HH:MM:SS` forms.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
}

pub fn parse_schedule_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn clock_time_accepts_both_clock_forms() {
        assert_eq!(
            parse_clock_time("09:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(
            parse_clock_time("2:15 PM"),
            NaiveTime::from_hms_opt(14, 15, 0)
        );
        assert_eq!(
            parse_clock_time("16:45:00"),
            NaiveTime::from_hms_opt(16, 45, 0)
        );
        assert_eq!(parse_clock_time("half past nine"), None);
    }

    #[test]
    fn schedule_date_accepts_us_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 10);
        assert_eq!(parse_schedule_date("09/10/2025"), expected);
        assert_eq!(parse_schedule_date("2025-09-10"), expected);
        assert_eq!(parse_schedule_date("September 10"), None);
    }

    #[tokio::test]
    async fn loads_rows_and_skips_bad_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"doctor_id": "D001", "doctor_name": "Dr. Johnson", "specialty": "Family Medicine",
                  "date": "09/10/2025", "start_time": "9:00 AM", "end_time": "10:00 AM",
                  "availability_status": "available"}},
                {{"doctor_id": "D002", "doctor_name": "Dr. Smith", "specialty": "Cardiology",
                  "date": "someday", "start_time": "09:00", "end_time": "09:30",
                  "availability_status": "available"}}
            ]"#
        )
        .unwrap();

        let store = ScheduleStore::load_from_file(file.path());
        let units = store.snapshot().await;
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].doctor_name, "Dr. Johnson");
        assert_eq!(units[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn missing_file_yields_empty_store() {
        let store = ScheduleStore::load_from_file("/nonexistent/schedules.json");
        assert!(store.snapshot().await.is_empty());
    }
}
