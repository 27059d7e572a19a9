use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::circulation::CirculationError;

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub struct ApiError(CirculationError);

impl From<CirculationError> for ApiError {
    fn from(err: CirculationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self.0 {
            // 404 Not Found - リクエストされたリソースが存在しない
            CirculationError::BookNotFound => {
                (StatusCode::NOT_FOUND, "BOOK_NOT_FOUND", "Book not found".to_string())
            }
            CirculationError::CheckoutNotFound => (
                StatusCode::NOT_FOUND,
                "CHECKOUT_NOT_FOUND",
                "Checkout not found".to_string(),
            ),

            // 422 Unprocessable Entity - リクエスト起因のビジネスルール違反
            CirculationError::InvalidPeriod => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_PERIOD",
                "Due date must be after checkout date".to_string(),
            ),
            CirculationError::InvalidArgument(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ARGUMENT", msg)
            }
            CirculationError::BookRetired => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "BOOK_RETIRED",
                "Book is retired from circulation".to_string(),
            ),

            // 409 Conflict - 現在の在庫・台帳の状態と衝突する要求
            CirculationError::OutOfStock => (
                StatusCode::CONFLICT,
                "OUT_OF_STOCK",
                "No copies available".to_string(),
            ),
            CirculationError::AlreadyReturned => (
                StatusCode::CONFLICT,
                "ALREADY_RETURNED",
                "Checkout already returned".to_string(),
            ),

            // 503 Service Unavailable - ロック競合。クライアントはリトライ可能
            CirculationError::Busy => {
                tracing::warn!("row lock contention surfaced to client");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BUSY",
                    "Storage busy, retry later".to_string(),
                )
            }

            // 500 Internal Server Error - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            CirculationError::StoreError(ref e) => {
                tracing::error!("store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}
