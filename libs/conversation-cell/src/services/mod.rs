// libs/conversation-cell/src/services/mod.rs
pub mod confirmation;
pub mod extraction;
pub mod session;
pub mod workflow;

pub use confirmation::ConfirmationService;
pub use extraction::{Extraction, InfoExtractor, RegexExtractor};
pub use session::SessionStore;
pub use workflow::AppointmentWorkflow;
