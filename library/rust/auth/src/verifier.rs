//! JWT 検証器: 共有シークレット（HS256）で署名と有効期限を検証する。

use crate::claims::Claims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};

/// AuthError は認証・認可エラーを表す。
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("missing authentication token")]
    MissingToken,

    #[error("invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("permission denied")]
    PermissionDenied,

    #[error("token signing failed: {0}")]
    SigningFailed(String),
}

/// JwtVerifier は HS256 署名の JWT を検証する。
pub struct JwtVerifier {
    secret: SecretString,
    issuer: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: SecretString, issuer: Option<String>) -> Self {
        Self { secret, issuer }
    }

    /// JWT トークン文字列を検証し、Claims を返す。
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        if let Some(ref iss) = self.issuer {
            validation.set_issuer(&[iss]);
        }

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        Ok(data.claims)
    }

    /// sign は Claims に署名してトークン文字列を返す。開発用トークン発行とテストで使用する。
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }
}

/// extract_bearer_token は Authorization ヘッダー値から Bearer トークンを取り出す。
pub fn extract_bearer_token(header_value: &str) -> Result<&str, AuthError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .or_else(|| header_value.strip_prefix("bearer "))
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// extract_cookie_token は Cookie ヘッダー値から指定名のトークンを取り出す。
pub fn extract_cookie_token<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}
