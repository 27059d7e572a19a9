use crate::domain::value_objects::{AuditAction, StaffId};
use crate::ports::CirculationTx;

/// 監査ログをベストエフォートで追記する
///
/// 監査ログの書き込み失敗は在庫・台帳の変更をロールバックしない。
/// 失敗はここで握りつぶし、警告ログだけを残す。結果として監査されない
/// 管理操作が発生しうるが、元システムの意図（監査失敗が業務を止めない）を
/// そのまま踏襲している。
pub(super) async fn record_audit(
    tx: &mut dyn CirculationTx,
    staff_id: Option<StaffId>,
    action: String,
) {
    let action = AuditAction::new(action);

    if let Err(e) = tx.append_audit(staff_id, &action).await {
        tracing::warn!(
            error = %e,
            staff_id = ?staff_id.map(|s| s.value()),
            action = %action,
            "audit log write failed; operation continues unaudited"
        );
    }
}
