//! JWT Claims 構造体。

use serde::{Deserialize, Serialize};

/// Claims は ERP が発行する JWT の Claims を表す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーの一意識別子
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// ロール名（ADMIN, MANAGER, ...）
    #[serde(default)]
    pub role: Option<String>,

    /// `{resource}:{action}` 形式の明示パーミッション
    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default, alias = "isSuperAdmin")]
    pub is_super_admin: bool,

    /// トークンの有効期限（Unix タイムスタンプ）
    pub exp: u64,

    #[serde(default)]
    pub iat: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// actor は監査項目に記録する操作者名を返す。email がなければ sub を使う。
    pub fn actor(&self) -> &str {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.sub)
    }
}

impl std::fmt::Display for Claims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Claims{{sub={}, email={:?}, role={:?}, super_admin={}}}",
            self.sub, self.email, self.role, self.is_super_admin,
        )
    }
}
