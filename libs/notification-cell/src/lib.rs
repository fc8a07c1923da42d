// libs/notification-cell/src/lib.rs
pub mod models;
pub mod services;

pub use models::*;
pub use services::*;
