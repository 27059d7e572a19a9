use serde::{Deserialize, Serialize};

use super::{AdjustInventoryError, BookId, BorrowDenied};

/// 在庫数の上限
///
/// ストレージ層の INTEGER 列に収まる範囲。調整サービスはこれを超える
/// 設定要求を範囲外として拒否する。
pub const MAX_COPIES: u32 = i32::MAX as u32;

/// 書籍の在庫行
///
/// 不変条件：`0 <= available_copies <= total_copies`。
/// このモジュールの純粋関数だけが在庫数を動かす。1冊ずつの増減（貸出・返却）か、
/// 管理者による直接設定（調整）のどちらか。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInventory {
    pub book_id: BookId,
    pub total_copies: u32,
    pub available_copies: u32,
    /// 除架済みの書籍は貸出不可（貸出履歴が残るため削除はしない）
    pub retired: bool,
}

/// 純粋関数：貸出のために在庫を1冊引き当てる
///
/// ビジネスルール：
/// - 除架済みの書籍は貸出不可
/// - 在庫0冊なら貸出不可
///
/// 副作用なし。減算済みの新しい在庫行を返す。
pub fn try_borrow(inventory: &BookInventory) -> Result<BookInventory, BorrowDenied> {
    if inventory.retired {
        return Err(BorrowDenied::Retired);
    }

    if inventory.available_copies == 0 {
        return Err(BorrowDenied::OutOfStock);
    }

    Ok(BookInventory {
        available_copies: inventory.available_copies - 1,
        ..inventory.clone()
    })
}

/// 純粋関数：返却により在庫を1冊戻す
///
/// `total_copies` を上限としてクランプする。調整で総数が先に減らされた場合でも
/// 不変条件を破らない。
pub fn restock(inventory: &BookInventory) -> BookInventory {
    BookInventory {
        available_copies: (inventory.available_copies + 1).min(inventory.total_copies),
        ..inventory.clone()
    }
}

/// 純粋関数：総冊数を設定する（管理者調整）
///
/// `available_copies` が新しい総数を超える場合は総数まで切り下げる。
pub fn with_total_copies(inventory: &BookInventory, new_total: u32) -> BookInventory {
    BookInventory {
        total_copies: new_total,
        available_copies: inventory.available_copies.min(new_total),
        ..inventory.clone()
    }
}

/// 純粋関数：貸出可能数を設定する（管理者調整）
///
/// # エラー
/// `new_available > total_copies` の場合は `AdjustInventoryError::ExceedsTotal`
pub fn with_available_copies(
    inventory: &BookInventory,
    new_available: u32,
) -> Result<BookInventory, AdjustInventoryError> {
    if new_available > inventory.total_copies {
        return Err(AdjustInventoryError::ExceedsTotal);
    }

    Ok(BookInventory {
        available_copies: new_available,
        ..inventory.clone()
    })
}
