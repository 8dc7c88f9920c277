use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use yeelo_auth::{AuthError, Claims, JwtVerifier};
use yeelo_server_common::error::auth as auth_codes;
use yeelo_server_common::ServiceError;

/// 認証無効時に監査項目へ記録する操作者名。
pub const ANONYMOUS_ACTOR: &str = "anonymous";

#[derive(Clone)]
pub struct ErpAuthState {
    pub verifier: Arc<JwtVerifier>,
    /// トークンを読み取る Cookie 名
    pub cookie_name: String,
}

impl ErpAuthState {
    pub fn new(verifier: Arc<JwtVerifier>, cookie_name: impl Into<String>) -> Self {
        Self {
            verifier,
            cookie_name: cookie_name.into(),
        }
    }
}

/// Authorization ヘッダーの Bearer トークン、なければ Cookie のトークンを検証し、
/// Claims をリクエスト拡張に格納する。
pub async fn auth_middleware(
    State(state): State<ErpAuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = extract_token(&req, &state.cookie_name)?;

    let claims = state.verifier.verify_token(&token).map_err(|e| {
        tracing::debug!(error = %e, "token verification failed");
        match e {
            AuthError::TokenExpired => ServiceError::Unauthorized {
                code: auth_codes::token_expired(),
                message: "token has expired".to_string(),
            },
            _ => ServiceError::Unauthorized {
                code: auth_codes::invalid_token(),
                message: "invalid token".to_string(),
            },
        }
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn extract_token(req: &Request<Body>, cookie_name: &str) -> Result<String, ServiceError> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        let value = value.to_str().unwrap_or_default();
        return yeelo_auth::verifier::extract_bearer_token(value)
            .map(str::to_string)
            .map_err(|_| ServiceError::Unauthorized {
                code: auth_codes::invalid_token(),
                message: "malformed Authorization header".to_string(),
            });
    }

    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookies| yeelo_auth::verifier::extract_cookie_token(cookies, cookie_name))
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Unauthorized {
            code: auth_codes::unauthorized(),
            message: "missing bearer token".to_string(),
        })
}

/// Actor は監査項目に記録する操作者名を取り出すエクストラクタ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor(
            parts
                .extensions
                .get::<Claims>()
                .map_or(ANONYMOUS_ACTOR, Claims::actor)
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_from_bearer_header() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer my-token"));
        assert_eq!(extract_token(&req, "auth-token").unwrap(), "my-token");
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth-token=cookie-token"),
        );
        assert_eq!(extract_token(&req, "auth-token").unwrap(), "cookie-token");
    }

    #[test]
    fn test_extract_token_wrong_scheme() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(extract_token(&req, "auth-token").is_err());
    }

    #[test]
    fn test_extract_token_missing() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(matches!(
            extract_token(&req, "auth-token"),
            Err(ServiceError::Unauthorized { .. })
        ));
    }
}
