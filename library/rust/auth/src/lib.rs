//! yeelo-auth: サーバー用 JWT（HS256）検証 + RBAC ライブラリ
//!
//! 共有シークレットで署名された JWT を検証し、Claims に含まれるロールと
//! 明示パーミッションからリソース単位の認可判定を行う。
//!
//! # 使い方
//!
//! ```ignore
//! use yeelo_auth::{has_permission, Action, JwtVerifier, Resource};
//!
//! let verifier = JwtVerifier::new(secret, Some("yeelo-erp".to_string()));
//! let claims = verifier.verify_token("eyJ...")?;
//! if has_permission(&claims, Resource::Sales, Action::Write) {
//!     // ...
//! }
//! ```

pub mod claims;
pub mod rbac;
pub mod verifier;

pub use claims::Claims;
pub use rbac::{has_permission, Action, Resource, Role};
pub use verifier::{AuthError, JwtVerifier};

#[cfg(test)]
mod tests;
