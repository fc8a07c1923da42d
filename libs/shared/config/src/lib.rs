use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub patient_store_path: String,
    pub schedule_store_path: String,
    pub admin_export_path: String,
    pub search_horizon_days: i64,
    pub bind_address: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_phone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            patient_store_path: env::var("PATIENT_STORE_PATH")
                .unwrap_or_else(|_| {
                    warn!("PATIENT_STORE_PATH not set, using default");
                    "data/patients.json".to_string()
                }),
            schedule_store_path: env::var("SCHEDULE_STORE_PATH")
                .unwrap_or_else(|_| {
                    warn!("SCHEDULE_STORE_PATH not set, using default");
                    "data/doctor_schedules.json".to_string()
                }),
            admin_export_path: env::var("ADMIN_EXPORT_PATH")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_EXPORT_PATH not set, using default");
                    "data/admin_export.jsonl".to_string()
                }),
            search_horizon_days: env::var("SEARCH_HORIZON_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            clinic_name: env::var("CLINIC_NAME")
                .unwrap_or_else(|_| "MediCare Allergy & Wellness Center".to_string()),
            clinic_address: env::var("CLINIC_ADDRESS")
                .unwrap_or_else(|_| "456 Healthcare Boulevard, Suite 300".to_string()),
            clinic_phone: env::var("CLINIC_PHONE")
                .unwrap_or_else(|_| "(555) 123-4567".to_string()),
        };

        if config.search_horizon_days <= 0 {
            warn!("SEARCH_HORIZON_DAYS must be positive, falling back to 14");
            return Self {
                search_horizon_days: 14,
                ..config
            };
        }

        config
    }
}
