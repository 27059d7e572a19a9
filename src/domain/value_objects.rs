use serde::{Deserialize, Serialize};

/// 書籍ID - カタログ管理コンテキストが採番する正の整数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookId(i64);

impl BookId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// 利用者ID - 認証レイヤーが供給する識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// 貸出ID - 貸出台帳がINSERT時に採番する識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckoutId(i64);

impl CheckoutId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// 職員ID - 職員管理コンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaffId(i64);

impl StaffId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// 監査ログの本文上限（文字数）
pub const MAX_AUDIT_ACTION_CHARS: usize = 255;

/// 監査ログ本文
///
/// 不変条件：255文字以内。超過分は252文字 + "..." に切り詰める。
/// 型システムでこの制約を強制し、保存時の桁あふれを防ぐ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAction(String);

impl AuditAction {
    /// 本文を受け取り、必要なら切り詰めて生成する
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        if action.chars().count() <= MAX_AUDIT_ACTION_CHARS {
            return Self(action);
        }

        let mut truncated: String = action.chars().take(MAX_AUDIT_ACTION_CHARS - 3).collect();
        truncated.push_str("...");
        Self(truncated)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
