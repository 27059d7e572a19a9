use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{self, BorrowDenied, commands::BorrowBook, value_objects::*};
use crate::ports::CirculationStore;

use super::audit::record_audit;
use super::errors::{CirculationError, Result};

/// サービスの依存関係
///
/// 振る舞いは持たず、純粋な関数に依存関係を渡すためのデータ構造。
/// 共有可変状態はトランザクショナルなストアだけで、リクエストごとの
/// ワーカーはこの構造体のクローンを持つ。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub store: Arc<dyn CirculationStore>,
}

/// 貸出結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowReceipt {
    pub checkout_id: CheckoutId,
    pub book_id: BookId,
    pub available_copies: u32,
    pub due_at: DateTime<Utc>,
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 返却期限は貸出日時より後であること
/// - 書籍が存在し、除架されておらず、在庫があること
/// - 在庫の減算と貸出行の挿入は同一トランザクションで行う
///
/// 最後の1冊への同時貸出は書籍行のロックで直列化され、一方だけが成功し
/// もう一方は `OutOfStock` を観測する。失敗時はトランザクション全体が
/// ロールバックされ、減算だけ・挿入だけの中間状態は外部から観測されない。
pub async fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<BorrowReceipt> {
    // 1. 貸出期間の検証（トランザクション外で弾ける）
    let plan = domain::checkout::plan_checkout(cmd.user_id, cmd.book_id, cmd.checkout_at, cmd.due_at)
        .map_err(|_| CirculationError::InvalidPeriod)?;

    let mut tx = deps.store.begin().await?;

    // 2. 書籍行をロックし、在庫を検査して1冊引き当てる
    let inventory = tx
        .lock_book(cmd.book_id)
        .await?
        .ok_or(CirculationError::BookNotFound)?;

    let inventory = domain::inventory::try_borrow(&inventory).map_err(|e| match e {
        BorrowDenied::Retired => CirculationError::BookRetired,
        BorrowDenied::OutOfStock => CirculationError::OutOfStock,
    })?;

    // 3-4. 在庫の減算と貸出行の挿入（同一トランザクション）
    tx.save_inventory(&inventory).await?;
    let checkout_id = tx.insert_checkout(&plan).await?;

    // 5. 職員による代行貸出のみ監査ログを残す
    if let Some(staff_id) = cmd.staff_id {
        record_audit(
            &mut *tx,
            Some(staff_id),
            format!(
                "checkout {}: book {} to user {}",
                checkout_id.value(),
                cmd.book_id.value(),
                cmd.user_id.value()
            ),
        )
        .await;
    }

    tx.commit().await?;

    tracing::debug!(
        checkout_id = checkout_id.value(),
        book_id = cmd.book_id.value(),
        available_copies = inventory.available_copies,
        "book borrowed"
    );

    Ok(BorrowReceipt {
        checkout_id,
        book_id: cmd.book_id,
        available_copies: inventory.available_copies,
        due_at: plan.due_at,
    })
}
