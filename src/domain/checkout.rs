use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, CheckoutId, CheckoutPeriodError, ReturnCheckoutError, UserId};

/// 貸出日から返却期限までの既定日数
///
/// APIリクエストで返却期限が省略された場合に使用する。
pub const DEFAULT_CHECKOUT_PERIOD_DAYS: i64 = 14;

/// 貸出台帳の1行
///
/// ライフサイクル：作成時は `returned_at = None`（貸出中）。返却で一度だけ
/// `returned_at` と `is_late` が設定され、以後は不変（終端状態）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub checkout_id: CheckoutId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    /// None は貸出中を意味する
    pub returned_at: Option<DateTime<Utc>>,
    /// 返却時に一度だけ確定する遅延フラグ。貸出中は None
    pub is_late: Option<bool>,
}

/// 検証済みの新規貸出
///
/// `plan_checkout` だけが生成できる。`due_at > checkout_at` が型の不変条件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckout {
    pub user_id: UserId,
    pub book_id: BookId,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// 純粋関数：新規貸出を計画する
///
/// ビジネスルール：
/// - 返却期限は貸出日時より後でなければならない（同時刻も不可）
///
/// 副作用なし。検証済みの `NewCheckout` を返す。
pub fn plan_checkout(
    user_id: UserId,
    book_id: BookId,
    checkout_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
) -> Result<NewCheckout, CheckoutPeriodError> {
    if due_at <= checkout_at {
        return Err(CheckoutPeriodError::InvalidPeriod);
    }

    Ok(NewCheckout {
        user_id,
        book_id,
        checkout_at,
        due_at,
    })
}

/// 純粋関数：返却を確定する
///
/// ビジネスルール：
/// - 既に返却済みの行は再返却不可
/// - 遅延判定 `is_late = returned_at > due_at` は返却時に一度だけ計算し、
///   以後変更しない（照会時に再計算される overdue とは別物）
///
/// 副作用なし。確定済みの行と遅延フラグを返す。
pub fn settle_return(
    checkout: &Checkout,
    returned_at: DateTime<Utc>,
) -> Result<(Checkout, bool), ReturnCheckoutError> {
    if checkout.returned_at.is_some() {
        return Err(ReturnCheckoutError::AlreadyReturned);
    }

    let is_late = returned_at > checkout.due_at;

    let settled = Checkout {
        returned_at: Some(returned_at),
        is_late: Some(is_late),
        ..checkout.clone()
    };

    Ok((settled, is_late))
}

/// 純粋関数：延滞判定（照会時に計算、保存しない）
///
/// 貸出中かつ照会時点で返却期限を過ぎている場合に true。
pub fn is_overdue(checkout: &Checkout, now: DateTime<Utc>) -> bool {
    checkout.returned_at.is_none() && now > checkout.due_at
}
