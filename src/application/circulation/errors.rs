use thiserror::Error;

use crate::ports::StoreError;

/// 貸出エンジンのアプリケーション層エラー
///
/// すべて型付きでHTTP層に伝搬する。`Busy` 以外のストア障害は詳細を
/// `#[source]` に保持し、境界でログに記録する。
#[derive(Debug, Error)]
pub enum CirculationError {
    /// 書籍が存在しない
    #[error("Book not found")]
    BookNotFound,

    /// 貸出が見つからない
    #[error("Checkout not found")]
    CheckoutNotFound,

    /// 除架済みの書籍は貸出不可
    #[error("Book is retired from circulation")]
    BookRetired,

    /// 貸出可能な在庫がない
    #[error("No copies available")]
    OutOfStock,

    /// 返却期限が貸出日時以前
    #[error("Due date must be after checkout date")]
    InvalidPeriod,

    /// 既に返却済み
    #[error("Checkout already returned")]
    AlreadyReturned,

    /// 調整値が負または範囲外
    #[error("Invalid adjustment: {0}")]
    InvalidArgument(String),

    /// 行ロックの取得がタイムアウトした（リトライ可能）
    #[error("Storage busy, retry later")]
    Busy,

    /// ストアのエラー
    #[error("Store error")]
    StoreError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for CirculationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy => CirculationError::Busy,
            StoreError::Backend(e) => CirculationError::StoreError(e),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, CirculationError>;
