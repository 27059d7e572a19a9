/// 貸出拒否の理由
///
/// 在庫行をロックした上での検査結果。どちらの場合も在庫は変更されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowDenied {
    /// 絶版・除架済みのため貸出不可
    Retired,
    /// 貸出可能な在庫が0冊
    OutOfStock,
}

/// 貸出期間のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPeriodError {
    /// 返却期限が貸出日時以前
    InvalidPeriod,
}

/// 返却のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCheckoutError {
    /// 既に返却済み（returned_at が設定済み）
    AlreadyReturned,
}

/// 在庫調整のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustInventoryError {
    /// available_copies が total_copies を超える
    ExceedsTotal,
}
