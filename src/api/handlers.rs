use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::application::circulation::{
    CirculationError, ServiceDependencies, adjust_available_copies as execute_adjust_available,
    adjust_total_copies as execute_adjust_total, borrow_book as execute_borrow_book,
    get_availability, list_active_checkouts, list_checkout_history,
    return_book as execute_return_book,
};
use crate::domain::checkout::DEFAULT_CHECKOUT_PERIOD_DAYS;
use crate::domain::commands::{AdjustAvailableCopies, AdjustTotalCopies, BorrowBook, ReturnBook};
use crate::domain::value_objects::{BookId, CheckoutId, StaffId, UserId};

use super::{
    error::ApiError,
    types::{
        AdjustAvailableRequest, AdjustCopiesRequest, BookResponse, BorrowRequest, BorrowResponse,
        CheckoutResponse, ListCheckoutsQuery, ReturnRequest, ReturnResponse,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

// ============================================================================
// Command handlers (POST / PATCH)
// ============================================================================

/// POST /checkouts - 書籍を貸し出す
///
/// 強制されるビジネスルール:
/// - 返却期限が貸出日時より後であること
/// - 書籍が存在し、除架されておらず、在庫があること
/// - 最後の1冊への同時リクエストは一方のみ成功すること
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<BorrowResponse>), ApiError> {
    let checkout_at = req.checkout_at.unwrap_or_else(Utc::now);
    let due_at = req
        .due_at
        .unwrap_or(checkout_at + Duration::days(DEFAULT_CHECKOUT_PERIOD_DAYS));

    let cmd = BorrowBook {
        user_id: UserId::new(req.user_id),
        book_id: BookId::new(req.book_id),
        checkout_at,
        due_at,
        staff_id: req.staff_id.map(StaffId::new),
    };

    let receipt = execute_borrow_book(&state.service_deps, cmd).await?;

    let response = BorrowResponse {
        message: "book checked out".to_string(),
        checkout_id: receipt.checkout_id.value(),
        book_id: receipt.book_id.value(),
        available_copies: receipt.available_copies,
        due_at: receipt.due_at,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /checkouts/:id/return - 書籍を返却する
///
/// 返却時刻は常にサーバー時計で決まる。遅延判定はここで一度だけ確定し、
/// 以後変更されない。
///
/// 強制されるビジネスルール:
/// - 貸出が存在すること
/// - 既に返却済みでないこと（二重返却は409）
pub async fn return_checkout(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<i64>,
    body: Option<Json<ReturnRequest>>,
) -> Result<(StatusCode, Json<ReturnResponse>), ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let cmd = ReturnBook {
        checkout_id: CheckoutId::new(checkout_id),
        returned_at: Utc::now(),
        staff_id: req.staff_id.map(StaffId::new),
    };

    let receipt = execute_return_book(&state.service_deps, cmd).await?;

    let response = ReturnResponse {
        message: "book returned".to_string(),
        checkout_id: receipt.checkout_id.value(),
        book_id: receipt.book_id.value(),
        available_copies: receipt.available_copies,
        is_late: receipt.is_late,
    };

    Ok((StatusCode::OK, Json(response)))
}

/// PATCH /books/:id/copies - 総冊数を調整する（管理者のみ）
pub async fn adjust_total_copies(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    Json(req): Json<AdjustCopiesRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let cmd = AdjustTotalCopies {
        book_id: BookId::new(book_id),
        new_total: req.copies,
        staff_id: req.staff_id.map(StaffId::new),
    };

    let updated = execute_adjust_total(&state.service_deps, cmd).await?;
    Ok(Json(BookResponse::from(updated)))
}

/// PATCH /books/:id/available - 貸出可能数を調整する（管理者のみ）
pub async fn adjust_available(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    Json(req): Json<AdjustAvailableRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let cmd = AdjustAvailableCopies {
        book_id: BookId::new(book_id),
        new_available: req.available,
        staff_id: req.staff_id.map(StaffId::new),
    };

    let updated = execute_adjust_available(&state.service_deps, cmd).await?;
    Ok(Json(BookResponse::from(updated)))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /books/:id/availability - 在庫照会
pub async fn get_book_availability(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> Result<Json<BookResponse>, QueryError> {
    match get_availability(&state.service_deps, BookId::new(book_id)).await {
        Ok(inventory) => Ok(Json(BookResponse::from(inventory))),
        Err(CirculationError::BookNotFound) => {
            Err(QueryError::NotFound(format!("Book {} not found", book_id)))
        }
        Err(e) => Err(QueryError::InternalError(e.to_string())),
    }
}

/// GET /checkouts - 利用者の貸出一覧
///
/// クエリパラメータ:
/// - user_id: 利用者ID（必須）
/// - active: true なら貸出中のみ、省略なら返却済みを含む全履歴
///
/// 各行には照会時点で計算した overdue フラグが付く。
pub async fn list_checkouts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCheckoutsQuery>,
) -> Result<Json<Vec<CheckoutResponse>>, QueryError> {
    // user_idを必須とする（認証レイヤーは外部コラボレーター）
    let user_id = query
        .user_id
        .ok_or_else(|| QueryError::BadRequest("user_id query parameter is required".to_string()))?;
    let user_id = UserId::new(user_id);

    let now = Utc::now();
    let summaries = if query.active.unwrap_or(false) {
        list_active_checkouts(&state.service_deps, user_id, now).await
    } else {
        list_checkout_history(&state.service_deps, user_id, now).await
    }
    .map_err(|e| QueryError::InternalError(e.to_string()))?;

    let responses: Vec<CheckoutResponse> =
        summaries.into_iter().map(CheckoutResponse::from).collect();

    Ok(Json(responses))
}

// ============================================================================
// Error types
// ============================================================================

/// クエリハンドラー用のエラー型
#[derive(Debug)]
pub enum QueryError {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            QueryError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            QueryError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            QueryError::InternalError(msg) => {
                // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
                tracing::error!("Internal error in query handler: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(super::types::ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}
