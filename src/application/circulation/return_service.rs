use serde::{Deserialize, Serialize};

use crate::domain::{self, commands::ReturnBook, value_objects::*};

use super::audit::record_audit;
use super::borrow_service::ServiceDependencies;
use super::errors::{CirculationError, Result};

/// 返却結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub checkout_id: CheckoutId,
    pub book_id: BookId,
    pub available_copies: u32,
    pub is_late: bool,
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 貸出行が存在し、未返却であること
/// - 遅延判定はサーバー時計による返却時刻で一度だけ計算し、不変として保存する
/// - 台帳の更新と在庫の加算は同一トランザクションで行う
///
/// 同一貸出への二重返却は貸出行のロックで直列化され、ちょうど一方が成功し
/// もう一方は `AlreadyReturned` で失敗する。在庫の加算は `total_copies` を
/// 上限にクランプされる。
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<ReturnReceipt> {
    let mut tx = deps.store.begin().await?;

    // 1. 貸出行をロックする。存在確認だけを先に行う read-then-write は
    //    二重返却の競合を防げないため、最初からロック付きで読む
    let checkout = tx
        .lock_checkout(cmd.checkout_id)
        .await?
        .ok_or(CirculationError::CheckoutNotFound)?;

    // 2. 返却の確定と遅延判定
    let (settled, is_late) = domain::checkout::settle_return(&checkout, cmd.returned_at)
        .map_err(|_| CirculationError::AlreadyReturned)?;
    tx.save_return(&settled).await?;

    // 3. 書籍行をロックして在庫を1冊戻す
    let inventory = tx
        .lock_book(checkout.book_id)
        .await?
        .ok_or(CirculationError::BookNotFound)?;
    let inventory = domain::inventory::restock(&inventory);
    tx.save_inventory(&inventory).await?;

    // 職員による代行返却のみ監査ログを残す
    if let Some(staff_id) = cmd.staff_id {
        record_audit(
            &mut *tx,
            Some(staff_id),
            format!(
                "return checkout {}: book {} (late: {})",
                cmd.checkout_id.value(),
                checkout.book_id.value(),
                is_late
            ),
        )
        .await;
    }

    tx.commit().await?;

    tracing::debug!(
        checkout_id = cmd.checkout_id.value(),
        book_id = checkout.book_id.value(),
        is_late,
        "book returned"
    );

    Ok(ReturnReceipt {
        checkout_id: cmd.checkout_id,
        book_id: checkout.book_id,
        available_copies: inventory.available_copies,
        is_late,
    })
}
