use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::checkout::{Checkout, NewCheckout};
use crate::domain::inventory::BookInventory;
use crate::domain::value_objects::{AuditAction, BookId, CheckoutId, StaffId, UserId};

/// ストア層のエラー
///
/// ロック競合によるタイムアウトだけを型で区別する。呼び出し側は `Busy` を
/// リトライ可能な失敗として扱える。それ以外はバックエンド固有のエラー。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row lock acquisition timed out")]
    Busy,
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// 貸出ビュー（照会用）
///
/// 貸出行に書籍タイトルを結合した非正規化ビュー。一覧系の照会だけが使う。
/// 書き込み経路はドメインの `Checkout` / `BookInventory` を使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutView {
    pub checkout_id: CheckoutId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub title: String,
    pub checkout_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_late: Option<bool>,
}

/// 貸出エンジンのトランザクション境界（unit of work）
///
/// `begin` で開始し、`commit` で確定する。コミットせずにドロップされた
/// トランザクションはロールバックされる。行ロックはトランザクション終了まで
/// 保持され、同一の書籍・貸出行への操作を直列化する。
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// トランザクションを開始する
    async fn begin(&self) -> Result<Box<dyn CirculationTx>>;

    /// 在庫照会（ロックなし）
    async fn get_availability(&self, book_id: BookId) -> Result<Option<BookInventory>>;

    /// 利用者の貸出中の行を取得する（貸出日時の降順）
    async fn list_active_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>>;

    /// 利用者の全貸出履歴を取得する（返却済み含む、貸出日時の降順）
    async fn list_all_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>>;
}

/// 進行中のトランザクション
///
/// 在庫（InventoryStore）、貸出台帳（CheckoutLedger）、監査ログ（StaffAuditLog）
/// への書き込みを1つの原子的な単位にまとめる。
#[async_trait]
pub trait CirculationTx: Send {
    /// 書籍行をロックして取得する（`SELECT ... FOR UPDATE` 相当）
    async fn lock_book(&mut self, book_id: BookId) -> Result<Option<BookInventory>>;

    /// 在庫数を保存する
    async fn save_inventory(&mut self, inventory: &BookInventory) -> Result<()>;

    /// 貸出行を挿入し、採番されたIDを返す
    async fn insert_checkout(&mut self, plan: &NewCheckout) -> Result<CheckoutId>;

    /// 貸出行をロックして取得する
    async fn lock_checkout(&mut self, checkout_id: CheckoutId) -> Result<Option<Checkout>>;

    /// 返却の確定を保存する（returned_at / is_late の設定は一度だけ）
    async fn save_return(&mut self, checkout: &Checkout) -> Result<()>;

    /// 監査ログを追記する
    ///
    /// 失敗しても呼び出し側はトランザクションを続行する（ベストエフォート）。
    async fn append_audit(&mut self, staff_id: Option<StaffId>, action: &AuditAction)
    -> Result<()>;

    /// トランザクションを確定する
    async fn commit(self: Box<Self>) -> Result<()>;
}
