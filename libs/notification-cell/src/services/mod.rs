// libs/notification-cell/src/services/mod.rs
pub mod export;
pub mod sender;

pub use export::{ExportSink, JsonlExportSink};
pub use sender::{LoggingNotificationSender, NotificationSender};
