use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::checkout::{Checkout, NewCheckout};
use crate::domain::inventory::BookInventory;
use crate::domain::value_objects::{AuditAction, BookId, CheckoutId, StaffId, UserId};
use crate::ports::circulation_store::{
    CheckoutView, CirculationStore as CirculationStoreTrait, CirculationTx as CirculationTxTrait,
    Result, StoreError,
};

/// 監査ログの1行（インメモリ表現）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffAuditEntry {
    pub staff_id: Option<StaffId>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BookRow {
    inventory: BookInventory,
    title: String,
}

#[derive(Debug, Clone)]
struct MemoryState {
    books: BTreeMap<i64, BookRow>,
    checkouts: BTreeMap<i64, Checkout>,
    audit_log: Vec<StaffAuditEntry>,
    next_checkout_id: i64,
    audit_failing: bool,
}

/// CirculationStoreのインメモリ実装
///
/// 統合テストとe2eテストで使用する。単一の非同期ミューテックスで
/// 全トランザクションを直列化する。行ロックより粒度は粗いが、
/// 「競合する操作は直列化され、コミットまで中間状態が見えない」という
/// 意味論はPostgres実装と同じ。ロールバックはスナップショットの復元で行う。
pub struct CirculationStore {
    state: Arc<Mutex<MemoryState>>,
}

impl CirculationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                books: BTreeMap::new(),
                checkouts: BTreeMap::new(),
                audit_log: Vec::new(),
                next_checkout_id: 1,
                audit_failing: false,
            })),
        }
    }

    /// テスト用に書籍を登録する
    pub async fn seed_book(&self, inventory: BookInventory, title: &str) {
        let mut state = self.state.lock().await;
        state.books.insert(
            inventory.book_id.value(),
            BookRow {
                inventory,
                title: title.to_string(),
            },
        );
    }

    /// テスト用：蓄積された監査ログを取得する
    pub async fn audit_entries(&self) -> Vec<StaffAuditEntry> {
        self.state.lock().await.audit_log.clone()
    }

    /// テスト用：以後の監査ログ書き込みを失敗させる
    ///
    /// 監査失敗が在庫操作を巻き戻さないことの検証に使う。
    pub async fn fail_audit_writes(&self, failing: bool) {
        self.state.lock().await.audit_failing = failing;
    }
}

impl Default for CirculationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn view_of(checkout: &Checkout, books: &BTreeMap<i64, BookRow>) -> CheckoutView {
    CheckoutView {
        checkout_id: checkout.checkout_id,
        user_id: checkout.user_id,
        book_id: checkout.book_id,
        title: books
            .get(&checkout.book_id.value())
            .map(|b| b.title.clone())
            .unwrap_or_default(),
        checkout_at: checkout.checkout_at,
        due_at: checkout.due_at,
        returned_at: checkout.returned_at,
        is_late: checkout.is_late,
    }
}

#[async_trait]
impl CirculationStoreTrait for CirculationStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTxTrait>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();

        Ok(Box::new(CirculationTx {
            guard,
            snapshot: Some(snapshot),
            committed: false,
        }))
    }

    async fn get_availability(&self, book_id: BookId) -> Result<Option<BookInventory>> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .get(&book_id.value())
            .map(|row| row.inventory.clone()))
    }

    async fn list_active_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>> {
        let state = self.state.lock().await;
        let mut views: Vec<CheckoutView> = state
            .checkouts
            .values()
            .filter(|c| c.user_id == user_id && c.returned_at.is_none())
            .map(|c| view_of(c, &state.books))
            .collect();
        views.sort_by(|a, b| b.checkout_at.cmp(&a.checkout_at));
        Ok(views)
    }

    async fn list_all_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>> {
        let state = self.state.lock().await;
        let mut views: Vec<CheckoutView> = state
            .checkouts
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| view_of(c, &state.books))
            .collect();
        views.sort_by(|a, b| b.checkout_at.cmp(&a.checkout_at));
        Ok(views)
    }
}

/// 進行中のインメモリトランザクション
///
/// 開始時のスナップショットを保持し、コミットされないままドロップされた場合は
/// 状態をスナップショットに巻き戻す。
pub struct CirculationTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
    committed: bool,
}

impl Drop for CirculationTx {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(snapshot) = self.snapshot.take() {
                *self.guard = snapshot;
            }
        }
    }
}

fn missing_row(what: &str) -> StoreError {
    StoreError::backend(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} row vanished mid-transaction", what),
    ))
}

#[async_trait]
impl CirculationTxTrait for CirculationTx {
    async fn lock_book(&mut self, book_id: BookId) -> Result<Option<BookInventory>> {
        Ok(self
            .guard
            .books
            .get(&book_id.value())
            .map(|row| row.inventory.clone()))
    }

    async fn save_inventory(&mut self, inventory: &BookInventory) -> Result<()> {
        let row = self
            .guard
            .books
            .get_mut(&inventory.book_id.value())
            .ok_or_else(|| missing_row("book"))?;
        row.inventory = inventory.clone();
        Ok(())
    }

    async fn insert_checkout(&mut self, plan: &NewCheckout) -> Result<CheckoutId> {
        let id = self.guard.next_checkout_id;
        self.guard.next_checkout_id += 1;

        let checkout_id = CheckoutId::new(id);
        self.guard.checkouts.insert(
            id,
            Checkout {
                checkout_id,
                user_id: plan.user_id,
                book_id: plan.book_id,
                checkout_at: plan.checkout_at,
                due_at: plan.due_at,
                returned_at: None,
                is_late: None,
            },
        );

        Ok(checkout_id)
    }

    async fn lock_checkout(&mut self, checkout_id: CheckoutId) -> Result<Option<Checkout>> {
        Ok(self.guard.checkouts.get(&checkout_id.value()).cloned())
    }

    async fn save_return(&mut self, checkout: &Checkout) -> Result<()> {
        let row = self
            .guard
            .checkouts
            .get_mut(&checkout.checkout_id.value())
            .ok_or_else(|| missing_row("checkout"))?;
        row.returned_at = checkout.returned_at;
        row.is_late = checkout.is_late;
        Ok(())
    }

    async fn append_audit(
        &mut self,
        staff_id: Option<StaffId>,
        action: &AuditAction,
    ) -> Result<()> {
        if self.guard.audit_failing {
            return Err(StoreError::backend(std::io::Error::other(
                "audit sink unavailable",
            )));
        }

        self.guard.audit_log.push(StaffAuditEntry {
            staff_id,
            action: action.as_str().to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tx = self;
        tx.committed = true;
        Ok(())
    }
}
