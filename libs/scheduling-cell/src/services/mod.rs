pub mod availability;
pub mod reservation;
pub mod schedule_store;

pub use availability::SlotSearchService;
pub use reservation::ReservationService;
pub use schedule_store::ScheduleStore;
