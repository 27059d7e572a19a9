pub mod circulation_store;

pub use circulation_store::{CirculationStore as InMemoryCirculationStore, StaffAuditEntry};
