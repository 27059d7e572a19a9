use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::circulation::CheckoutSummary;
use crate::domain::inventory::BookInventory;

/// 貸出リクエスト（POST /checkouts）
///
/// `checkout_at` 省略時はサーバー時刻、`due_at` 省略時は貸出日時 + 既定の
/// 貸出期間（14日）が使われる。`staff_id` は職員による代行操作のときのみ。
#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub user_id: i64,
    pub book_id: i64,
    pub checkout_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub staff_id: Option<i64>,
}

/// 貸出レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BorrowResponse {
    pub message: String,
    pub checkout_id: i64,
    pub book_id: i64,
    pub available_copies: u32,
    pub due_at: DateTime<Utc>,
}

/// 返却リクエスト（POST /checkouts/:id/return）
///
/// 返却時刻はサーバー時計で決まるため本文には含めない。
#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    pub staff_id: Option<i64>,
}

/// 返却レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ReturnResponse {
    pub message: String,
    pub checkout_id: i64,
    pub book_id: i64,
    pub available_copies: u32,
    pub is_late: bool,
}

/// 貸出一覧のクエリパラメータ（GET /checkouts）
#[derive(Debug, Deserialize)]
pub struct ListCheckoutsQuery {
    /// 利用者IDでフィルタリング（必須）
    pub user_id: Option<i64>,
    /// true なら貸出中のみ、省略・false なら全履歴
    pub active: Option<bool>,
}

/// 貸出レスポンス（一覧用）
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub title: String,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_late: Option<bool>,
    pub overdue: bool,
}

impl From<CheckoutSummary> for CheckoutResponse {
    fn from(summary: CheckoutSummary) -> Self {
        Self {
            checkout_id: summary.checkout_id.value(),
            user_id: summary.user_id.value(),
            book_id: summary.book_id.value(),
            title: summary.title,
            checkout_at: summary.checkout_at,
            due_at: summary.due_at,
            returned_at: summary.returned_at,
            is_late: summary.is_late,
            overdue: summary.overdue,
        }
    }
}

/// 在庫レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: i64,
    pub total_copies: u32,
    pub available_copies: u32,
    pub retired: bool,
}

impl From<BookInventory> for BookResponse {
    fn from(inventory: BookInventory) -> Self {
        Self {
            book_id: inventory.book_id.value(),
            total_copies: inventory.total_copies,
            available_copies: inventory.available_copies,
            retired: inventory.retired,
        }
    }
}

/// 総冊数調整リクエスト（PATCH /books/:id/copies）
#[derive(Debug, Deserialize)]
pub struct AdjustCopiesRequest {
    pub copies: i64,
    pub staff_id: Option<i64>,
}

/// 貸出可能数調整リクエスト（PATCH /books/:id/available）
#[derive(Debug, Deserialize)]
pub struct AdjustAvailableRequest {
    pub available: i64,
    pub staff_id: Option<i64>,
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
