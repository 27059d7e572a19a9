use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::inventory::BookInventory;
use crate::domain::value_objects::{BookId, CheckoutId, UserId};
use crate::ports::CheckoutView;

use super::borrow_service::ServiceDependencies;
use super::errors::{CirculationError, Result};

/// 照会用の貸出サマリー
///
/// `overdue` は照会時点で計算される（保存されない）。返却時に確定する
/// `is_late` とは別物。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub checkout_id: CheckoutId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub title: String,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_late: Option<bool>,
    pub overdue: bool,
}

/// 純粋関数：貸出ビューをサマリーに変換する
///
/// overdue = 未返却 かつ 照会時点で返却期限超過
pub fn summarize(view: CheckoutView, now: DateTime<Utc>) -> CheckoutSummary {
    let overdue = view.returned_at.is_none() && now > view.due_at;

    CheckoutSummary {
        checkout_id: view.checkout_id,
        user_id: view.user_id,
        book_id: view.book_id,
        title: view.title,
        checkout_at: view.checkout_at,
        due_at: view.due_at,
        returned_at: view.returned_at,
        is_late: view.is_late,
        overdue,
    }
}

/// 在庫照会
pub async fn get_availability(
    deps: &ServiceDependencies,
    book_id: BookId,
) -> Result<BookInventory> {
    deps.store
        .get_availability(book_id)
        .await?
        .ok_or(CirculationError::BookNotFound)
}

/// 利用者の貸出中一覧（貸出日時の降順）
pub async fn list_active_checkouts(
    deps: &ServiceDependencies,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<Vec<CheckoutSummary>> {
    let views = deps.store.list_active_for_user(user_id).await?;
    Ok(views.into_iter().map(|v| summarize(v, now)).collect())
}

/// 利用者の全貸出履歴（返却済み含む、貸出日時の降順）
pub async fn list_checkout_history(
    deps: &ServiceDependencies,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<Vec<CheckoutSummary>> {
    let views = deps.store.list_all_for_user(user_id).await?;
    Ok(views.into_iter().map(|v| summarize(v, now)).collect())
}
