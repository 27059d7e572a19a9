mod adjustment_service;
mod audit;
mod borrow_service;
mod errors;
mod queries;
mod return_service;

pub use adjustment_service::{adjust_available_copies, adjust_total_copies};
pub use borrow_service::{BorrowReceipt, ServiceDependencies, borrow_book};
pub use errors::{CirculationError, Result};
pub use queries::{
    CheckoutSummary, get_availability, list_active_checkouts, list_checkout_history, summarize,
};
pub use return_service::{ReturnReceipt, return_book};
