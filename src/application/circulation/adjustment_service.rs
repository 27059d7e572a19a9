use crate::domain::{
    self, AdjustInventoryError,
    commands::{AdjustAvailableCopies, AdjustTotalCopies},
    inventory::{BookInventory, MAX_COPIES},
};

use super::audit::record_audit;
use super::borrow_service::ServiceDependencies;
use super::errors::{CirculationError, Result};

/// 総冊数を調整する（管理者のみ）
///
/// 負数は `InvalidArgument`。`available_copies` は新しい総数まで切り下げられる。
/// 書籍行のロックにより、進行中の貸出・返却と競合しない。
pub async fn adjust_total_copies(
    deps: &ServiceDependencies,
    cmd: AdjustTotalCopies,
) -> Result<BookInventory> {
    let new_total = u32::try_from(cmd.new_total)
        .ok()
        .filter(|v| *v <= MAX_COPIES)
        .ok_or_else(|| {
            CirculationError::InvalidArgument(format!(
                "total_copies must be between 0 and {}, got {}",
                MAX_COPIES, cmd.new_total
            ))
        })?;

    let mut tx = deps.store.begin().await?;

    let inventory = tx
        .lock_book(cmd.book_id)
        .await?
        .ok_or(CirculationError::BookNotFound)?;

    let updated = domain::inventory::with_total_copies(&inventory, new_total);
    tx.save_inventory(&updated).await?;

    // 管理者の在庫調整は常に監査対象（システム操作では staff_id が None になりうる）
    record_audit(
        &mut *tx,
        cmd.staff_id,
        format!(
            "set total copies of book {} to {} (was {}, available {} -> {})",
            cmd.book_id.value(),
            updated.total_copies,
            inventory.total_copies,
            inventory.available_copies,
            updated.available_copies
        ),
    )
    .await;

    tx.commit().await?;

    Ok(updated)
}

/// 貸出可能数を調整する（管理者のみ）
///
/// 負数および総冊数を超える値は `InvalidArgument`。
pub async fn adjust_available_copies(
    deps: &ServiceDependencies,
    cmd: AdjustAvailableCopies,
) -> Result<BookInventory> {
    let new_available = u32::try_from(cmd.new_available)
        .ok()
        .filter(|v| *v <= MAX_COPIES)
        .ok_or_else(|| {
            CirculationError::InvalidArgument(format!(
                "available_copies must be between 0 and {}, got {}",
                MAX_COPIES, cmd.new_available
            ))
        })?;

    let mut tx = deps.store.begin().await?;

    let inventory = tx
        .lock_book(cmd.book_id)
        .await?
        .ok_or(CirculationError::BookNotFound)?;

    let updated = domain::inventory::with_available_copies(&inventory, new_available).map_err(
        |AdjustInventoryError::ExceedsTotal| {
            CirculationError::InvalidArgument(format!(
                "available_copies {} exceeds total_copies {}",
                new_available, inventory.total_copies
            ))
        },
    )?;
    tx.save_inventory(&updated).await?;

    record_audit(
        &mut *tx,
        cmd.staff_id,
        format!(
            "set available copies of book {} to {} (was {})",
            cmd.book_id.value(),
            updated.available_copies,
            inventory.available_copies
        ),
    )
    .await;

    tx.commit().await?;

    Ok(updated)
}
