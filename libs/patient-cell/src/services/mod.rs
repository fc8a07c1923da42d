pub mod matching;
pub mod store;

pub use matching::IdentityMatcherService;
pub use store::{InMemoryPatientStore, PatientStore};
