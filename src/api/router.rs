use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, adjust_available, adjust_total_copies, create_checkout, get_book_availability,
    list_checkouts, return_checkout,
};

/// Creates the API router with all circulation endpoints
///
/// Command endpoints (Write operations):
/// - POST /checkouts - Borrow a book
/// - POST /checkouts/:id/return - Return a book
/// - PATCH /books/:id/copies - Adjust total copies (admin)
/// - PATCH /books/:id/available - Adjust available copies (admin)
///
/// Query endpoints (Read operations):
/// - GET /checkouts?user_id=&active= - List a user's checkouts
/// - GET /books/:id/availability - Inventory lookup
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Borrowing: create (write) and list (read) share the path
        .route("/checkouts", post(create_checkout).get(list_checkouts))
        .route("/checkouts/:id/return", post(return_checkout))
        // Admin adjustments and inventory lookup
        .route("/books/:id/copies", patch(adjust_total_copies))
        .route("/books/:id/available", patch(adjust_available))
        .route("/books/:id/availability", get(get_book_availability))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
