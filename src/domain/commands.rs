use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, CheckoutId, StaffId, UserId};

/// コマンド：書籍を貸し出す
///
/// `staff_id` は職員が窓口で代行した場合のみ設定される。
/// 利用者のセルフ貸出では None となり、監査ログは書かれない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowBook {
    pub user_id: UserId,
    pub book_id: BookId,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub staff_id: Option<StaffId>,
}

/// コマンド：書籍を返却する
///
/// `returned_at` はサーバー側の時計で設定する（クライアント供給の時刻は使わない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnBook {
    pub checkout_id: CheckoutId,
    pub returned_at: DateTime<Utc>,
    pub staff_id: Option<StaffId>,
}

/// コマンド：総冊数を調整する（管理者のみ）
///
/// 値は符号付きのまま受け取り、アプリケーション層で非負を検証する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustTotalCopies {
    pub book_id: BookId,
    pub new_total: i64,
    pub staff_id: Option<StaffId>,
}

/// コマンド：貸出可能数を調整する（管理者のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustAvailableCopies {
    pub book_id: BookId,
    pub new_available: i64,
    pub staff_id: Option<StaffId>,
}
