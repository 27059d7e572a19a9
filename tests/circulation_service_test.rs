use chrono::{DateTime, Duration, Utc};
use rusty_circulation::adapters::memory::InMemoryCirculationStore;
use rusty_circulation::application::circulation::{
    CirculationError, ServiceDependencies, adjust_available_copies, adjust_total_copies,
    borrow_book, get_availability, list_active_checkouts, list_checkout_history, return_book,
};
use rusty_circulation::domain::commands::{
    AdjustAvailableCopies, AdjustTotalCopies, BorrowBook, ReturnBook,
};
use rusty_circulation::domain::inventory::BookInventory;
use rusty_circulation::domain::value_objects::{BookId, CheckoutId, StaffId, UserId};
use rusty_circulation::ports::{
    CheckoutView, CirculationStore as CirculationStorePort, CirculationTx, StoreError,
};
use std::sync::Arc;

// ============================================================================
// テスト用ヘルパー
// ============================================================================

fn inventory(book_id: i64, total: u32, available: u32, retired: bool) -> BookInventory {
    BookInventory {
        book_id: BookId::new(book_id),
        total_copies: total,
        available_copies: available,
        retired,
    }
}

/// インメモリストアと依存関係をセットアップ
async fn setup(books: Vec<BookInventory>) -> (ServiceDependencies, Arc<InMemoryCirculationStore>) {
    let store = Arc::new(InMemoryCirculationStore::new());
    for book in books {
        store.seed_book(book, "Test Book").await;
    }

    let deps = ServiceDependencies {
        store: store.clone(),
    };
    (deps, store)
}

fn ts(value: &str) -> DateTime<Utc> {
    value.parse().expect("invalid timestamp in test")
}

fn borrow_cmd(user_id: i64, book_id: i64, checkout_at: &str, due_at: &str) -> BorrowBook {
    BorrowBook {
        user_id: UserId::new(user_id),
        book_id: BookId::new(book_id),
        checkout_at: ts(checkout_at),
        due_at: ts(due_at),
        staff_id: None,
    }
}

// ============================================================================
// 貸出
// ============================================================================

#[tokio::test]
async fn test_borrow_decrements_available_copies() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    assert_eq!(receipt.book_id, BookId::new(1));
    assert_eq!(receipt.available_copies, 1);
    assert_eq!(receipt.due_at, ts("2025-01-15T00:00:00Z"));

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 1);
    assert_eq!(book.total_copies, 2);
}

#[tokio::test]
async fn test_borrow_with_due_equal_to_checkout_fails_without_state_change() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let result = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-01T00:00:00Z"),
    )
    .await;

    assert!(matches!(result, Err(CirculationError::InvalidPeriod)));

    // 在庫も台帳も変化しないこと
    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 2);
    let active = list_active_checkouts(&deps, UserId::new(10), Utc::now())
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_borrow_unknown_book_fails() {
    let (deps, _) = setup(vec![]).await;

    let result = borrow_book(
        &deps,
        borrow_cmd(10, 99, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await;

    assert!(matches!(result, Err(CirculationError::BookNotFound)));
}

#[tokio::test]
async fn test_borrow_retired_book_fails() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, true)]).await;

    let result = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await;

    assert!(matches!(result, Err(CirculationError::BookRetired)));
}

#[tokio::test]
async fn test_borrow_out_of_stock_fails() {
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    let result = borrow_book(
        &deps,
        borrow_cmd(11, 1, "2025-01-02T00:00:00Z", "2025-01-16T00:00:00Z"),
    )
    .await;

    assert!(matches!(result, Err(CirculationError::OutOfStock)));
}

#[tokio::test]
async fn test_concurrent_borrows_of_last_copy_one_succeeds() {
    // 最後の1冊への同時貸出：ちょうど一方が成功し、他方はOutOfStock
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    let deps_a = deps.clone();
    let deps_b = deps.clone();

    let task_a = tokio::spawn(async move {
        borrow_book(
            &deps_a,
            borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
        )
        .await
    });
    let task_b = tokio::spawn(async move {
        borrow_book(
            &deps_b,
            borrow_cmd(11, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
        )
        .await
    });

    let (result_a, result_b) = (task_a.await.unwrap(), task_b.await.unwrap());

    let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let out_of_stock = [&result_a, &result_b]
        .iter()
        .filter(|r| matches!(r, Err(CirculationError::OutOfStock)))
        .count();
    assert_eq!(out_of_stock, 1);

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 0);
}

// ============================================================================
// 返却
// ============================================================================

#[tokio::test]
async fn test_return_on_time_increments_available() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    let returned = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt.checkout_id,
            returned_at: ts("2025-01-10T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();

    assert!(!returned.is_late);
    assert_eq!(returned.available_copies, 2);
    assert_eq!(returned.book_id, BookId::new(1));
}

#[tokio::test]
async fn test_double_return_fails_and_increments_only_once() {
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    let cmd = ReturnBook {
        checkout_id: receipt.checkout_id,
        returned_at: ts("2025-01-10T00:00:00Z"),
        staff_id: None,
    };

    return_book(&deps, cmd).await.unwrap();
    let second = return_book(&deps, cmd).await;

    assert!(matches!(second, Err(CirculationError::AlreadyReturned)));

    // 在庫は一度しか加算されない
    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 1);
}

#[tokio::test]
async fn test_concurrent_double_return_exactly_one_succeeds() {
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    let cmd = ReturnBook {
        checkout_id: receipt.checkout_id,
        returned_at: ts("2025-01-10T00:00:00Z"),
        staff_id: None,
    };

    let (result_a, result_b) =
        futures::future::join(return_book(&deps, cmd), return_book(&deps, cmd)).await;

    let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let already_returned = [&result_a, &result_b]
        .iter()
        .filter(|r| matches!(r, Err(CirculationError::AlreadyReturned)))
        .count();
    assert_eq!(already_returned, 1);

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 1);
}

#[tokio::test]
async fn test_return_unknown_checkout_fails() {
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    let result = return_book(
        &deps,
        ReturnBook {
            checkout_id: CheckoutId::new(42),
            returned_at: Utc::now(),
            staff_id: None,
        },
    )
    .await;

    assert!(matches!(result, Err(CirculationError::CheckoutNotFound)));
}

#[tokio::test]
async fn test_lateness_is_decided_at_the_due_date_boundary() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;
    let due = ts("2025-01-15T00:00:00Z");

    // 期限の1秒前の返却は遅延ではない
    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    let on_time = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt.checkout_id,
            returned_at: due - Duration::seconds(1),
            staff_id: None,
        },
    )
    .await
    .unwrap();
    assert!(!on_time.is_late);

    // 期限の1秒後の返却は遅延
    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    let late = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt.checkout_id,
            returned_at: due + Duration::seconds(1),
            staff_id: None,
        },
    )
    .await
    .unwrap();
    assert!(late.is_late);
}

#[tokio::test]
async fn test_return_clamps_restock_when_total_was_reduced() {
    // 貸出中に総冊数が0に調整された場合、返却しても在庫は上限（0）を超えない
    let (deps, _) = setup(vec![inventory(1, 1, 1, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 0,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await
    .unwrap();

    let returned = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt.checkout_id,
            returned_at: ts("2025-01-10T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.available_copies, 0);
    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert!(book.available_copies <= book.total_copies);
}

// ============================================================================
// シナリオ：2冊の書籍の貸出・返却サイクル
// ============================================================================

#[tokio::test]
async fn test_full_two_copy_circulation_scenario() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    // U1が借りる → 残1
    let receipt_u1 = borrow_book(
        &deps,
        borrow_cmd(1, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    assert_eq!(receipt_u1.available_copies, 1);

    // U2が借りる → 残0
    let receipt_u2 = borrow_book(
        &deps,
        borrow_cmd(2, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    assert_eq!(receipt_u2.available_copies, 0);

    // U3は借りられない
    let result_u3 = borrow_book(
        &deps,
        borrow_cmd(3, 1, "2025-01-02T00:00:00Z", "2025-01-16T00:00:00Z"),
    )
    .await;
    assert!(matches!(result_u3, Err(CirculationError::OutOfStock)));

    // U1が期限内に返却 → 遅延なし、残1
    let return_u1 = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt_u1.checkout_id,
            returned_at: ts("2025-01-10T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();
    assert!(!return_u1.is_late);
    assert_eq!(return_u1.available_copies, 1);

    // U2が期限後に返却 → 遅延、残2
    let return_u2 = return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt_u2.checkout_id,
            returned_at: ts("2025-02-01T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();
    assert!(return_u2.is_late);
    assert_eq!(return_u2.available_copies, 2);
}

#[tokio::test]
async fn test_available_equals_total_minus_active_checkouts() {
    // 不変条件：available_copies = total_copies - 貸出中の件数
    let (deps, _) = setup(vec![inventory(1, 3, 3, false)]).await;

    let r1 = borrow_book(
        &deps,
        borrow_cmd(1, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    borrow_book(
        &deps,
        borrow_cmd(2, 1, "2025-01-02T00:00:00Z", "2025-01-16T00:00:00Z"),
    )
    .await
    .unwrap();

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 1);
    assert_eq!(book.total_copies - book.available_copies, 2);

    return_book(
        &deps,
        ReturnBook {
            checkout_id: r1.checkout_id,
            returned_at: ts("2025-01-05T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 2);
    assert_eq!(book.total_copies - book.available_copies, 1);
}

// ============================================================================
// 管理者調整
// ============================================================================

#[tokio::test]
async fn test_adjust_total_copies_clamps_available() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let updated = adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 1,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.total_copies, 1);
    assert_eq!(updated.available_copies, 1);
}

#[tokio::test]
async fn test_adjust_total_copies_rejects_negative() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let result = adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: -1,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await;

    assert!(matches!(result, Err(CirculationError::InvalidArgument(_))));

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.total_copies, 2);
}

#[tokio::test]
async fn test_adjust_total_copies_rejects_value_over_storage_range() {
    // i32列に収まらない総数は減算前に範囲外として弾く
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let result = adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 3_000_000_000,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await;

    assert!(matches!(result, Err(CirculationError::InvalidArgument(_))));

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.total_copies, 2);
}

#[tokio::test]
async fn test_adjust_available_copies_within_range() {
    let (deps, _) = setup(vec![inventory(1, 3, 1, false)]).await;

    let updated = adjust_available_copies(
        &deps,
        AdjustAvailableCopies {
            book_id: BookId::new(1),
            new_available: 3,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.available_copies, 3);
}

#[tokio::test]
async fn test_adjust_available_copies_rejects_over_total() {
    let (deps, _) = setup(vec![inventory(1, 3, 1, false)]).await;

    let result = adjust_available_copies(
        &deps,
        AdjustAvailableCopies {
            book_id: BookId::new(1),
            new_available: 4,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await;

    assert!(matches!(result, Err(CirculationError::InvalidArgument(_))));

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.available_copies, 1);
}

// ============================================================================
// 監査ログ
// ============================================================================

#[tokio::test]
async fn test_staff_borrow_writes_audit_entry() {
    let (deps, store) = setup(vec![inventory(1, 2, 2, false)]).await;

    let mut cmd = borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z");
    cmd.staff_id = Some(StaffId::new(7));

    borrow_book(&deps, cmd).await.unwrap();

    let entries = store.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].staff_id, Some(StaffId::new(7)));
    assert!(entries[0].action.contains("book 1"));
}

#[tokio::test]
async fn test_self_service_borrow_writes_no_audit_entry() {
    let (deps, store) = setup(vec![inventory(1, 2, 2, false)]).await;

    borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();

    assert!(store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_adjustment_writes_audit_entry_describing_change() {
    let (deps, store) = setup(vec![inventory(1, 2, 2, false)]).await;

    adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 5,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await
    .unwrap();

    let entries = store.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].action.contains("total copies"));
    assert!(entries[0].action.contains("5"));
}

#[tokio::test]
async fn test_audit_write_failure_does_not_block_adjustment() {
    // 監査ログの書き込み失敗は在庫変更をロールバックしない
    let (deps, store) = setup(vec![inventory(1, 2, 2, false)]).await;
    store.fail_audit_writes(true).await;

    let updated = adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 1,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.total_copies, 1);
    assert!(store.audit_entries().await.is_empty());

    let book = get_availability(&deps, BookId::new(1)).await.unwrap();
    assert_eq!(book.total_copies, 1);
}

// ============================================================================
// 照会
// ============================================================================

#[tokio::test]
async fn test_get_availability_unknown_book_fails() {
    let (deps, _) = setup(vec![]).await;

    let result = get_availability(&deps, BookId::new(99)).await;
    assert!(matches!(result, Err(CirculationError::BookNotFound)));
}

#[tokio::test]
async fn test_list_active_checkouts_ordered_newest_first() {
    let (deps, _) = setup(vec![inventory(1, 3, 3, false)]).await;

    borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-03T00:00:00Z", "2025-01-17T00:00:00Z"),
    )
    .await
    .unwrap();

    let active = list_active_checkouts(&deps, UserId::new(10), ts("2025-01-05T00:00:00Z"))
        .await
        .unwrap();

    assert_eq!(active.len(), 2);
    assert_eq!(active[0].checkout_at, ts("2025-01-03T00:00:00Z"));
    assert_eq!(active[1].checkout_at, ts("2025-01-01T00:00:00Z"));
    assert!(active.iter().all(|c| !c.overdue));
}

#[tokio::test]
async fn test_list_history_includes_returned_and_computes_overdue() {
    let (deps, _) = setup(vec![inventory(1, 2, 2, false)]).await;

    let receipt = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await
    .unwrap();
    return_book(
        &deps,
        ReturnBook {
            checkout_id: receipt.checkout_id,
            returned_at: ts("2025-01-20T00:00:00Z"),
            staff_id: None,
        },
    )
    .await
    .unwrap();

    borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-02T00:00:00Z", "2025-01-10T00:00:00Z"),
    )
    .await
    .unwrap();

    // 照会時点は両方の期限より後
    let now = ts("2025-02-01T00:00:00Z");
    let history = list_checkout_history(&deps, UserId::new(10), now)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    // 返却済みの行：overdueではないが、遅延フラグは確定済み
    let returned_row = history
        .iter()
        .find(|c| c.returned_at.is_some())
        .expect("returned row missing");
    assert!(!returned_row.overdue);
    assert_eq!(returned_row.is_late, Some(true));

    // 貸出中で期限超過の行：overdue
    let active_row = history
        .iter()
        .find(|c| c.returned_at.is_none())
        .expect("active row missing");
    assert!(active_row.overdue);
    assert_eq!(active_row.is_late, None);

    // 貸出中の一覧には返却済みの行が含まれない
    let active = list_active_checkouts(&deps, UserId::new(10), now)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

// ============================================================================
// ロック競合（Busy）
// ============================================================================

/// ロック待ちのタイムアウトを常に返すストア
///
/// 行ロックが期限内に取得できなかった場合のエラー伝搬経路を検証する。
struct ContendedStore;

#[async_trait::async_trait]
impl CirculationStorePort for ContendedStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTx>, StoreError> {
        Err(StoreError::Busy)
    }

    async fn get_availability(&self, _book_id: BookId) -> Result<Option<BookInventory>, StoreError> {
        Err(StoreError::Busy)
    }

    async fn list_active_for_user(&self, _user_id: UserId) -> Result<Vec<CheckoutView>, StoreError> {
        Err(StoreError::Busy)
    }

    async fn list_all_for_user(&self, _user_id: UserId) -> Result<Vec<CheckoutView>, StoreError> {
        Err(StoreError::Busy)
    }
}

#[tokio::test]
async fn test_lock_timeout_surfaces_as_busy() {
    let deps = ServiceDependencies {
        store: Arc::new(ContendedStore),
    };

    let borrow = borrow_book(
        &deps,
        borrow_cmd(10, 1, "2025-01-01T00:00:00Z", "2025-01-15T00:00:00Z"),
    )
    .await;
    assert!(matches!(borrow, Err(CirculationError::Busy)));

    let ret = return_book(
        &deps,
        ReturnBook {
            checkout_id: CheckoutId::new(1),
            returned_at: ts("2025-01-10T00:00:00Z"),
            staff_id: None,
        },
    )
    .await;
    assert!(matches!(ret, Err(CirculationError::Busy)));

    let adjust = adjust_total_copies(
        &deps,
        AdjustTotalCopies {
            book_id: BookId::new(1),
            new_total: 3,
            staff_id: Some(StaffId::new(7)),
        },
    )
    .await;
    assert!(matches!(adjust, Err(CirculationError::Busy)));
}
