// libs/notification-cell/src/services/export.rs
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::models::BookingSummary;

/// Administrative record of completed bookings. Best-effort; a `false`
/// return never unwinds the booking it describes.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn record_completed_booking(&self, summary: &BookingSummary) -> bool;
}

/// Appends one JSON line per completed booking to a local file. The mutex
/// keeps interleaved appends from different conversation threads whole.
pub struct JsonlExportSink {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonlExportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ExportSink for JsonlExportSink {
    async fn record_completed_booking(&self, summary: &BookingSummary) -> bool {
        let _guard = self.write_guard.lock().await;

        let line = match serde_json::to_string(summary) {
            Ok(line) => line,
            Err(e) => {
                error!("Could not serialize booking summary: {}", e);
                return false;
            }
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));

        match result {
            Ok(()) => {
                debug!(
                    "Recorded booking {} to {}",
                    summary.booking_id,
                    self.path.display()
                );
                true
            }
            Err(e) => {
                error!("Booking export to {} failed: {}", self.path.display(), e);
                false
            }
        }
    }
}
