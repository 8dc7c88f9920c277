use std::future::Future;
use std::pin::Pin;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use yeelo_auth::{has_permission, Action, Claims, Resource};
use yeelo_server_common::error::auth as auth_codes;
use yeelo_server_common::ServiceError;

type RbacFuture = Pin<Box<dyn Future<Output = Result<Response, ServiceError>> + Send>>;

/// ルートグループに `{resource}:{action}` の権限を要求するミドルウェアを返す。
pub fn require_permission(
    resource: Resource,
    action: Action,
) -> impl Fn(Request<Body>, Next) -> RbacFuture + Clone {
    move |req, next| Box::pin(rbac_check(req, next, resource, action))
}

async fn rbac_check(
    req: Request<Body>,
    next: Next,
    resource: Resource,
    action: Action,
) -> Result<Response, ServiceError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ServiceError::Unauthorized {
            code: auth_codes::missing_claims(),
            message: "missing authentication claims".to_string(),
        })?;

    if !has_permission(claims, resource, action) {
        tracing::warn!(
            sub = %claims.sub,
            role = ?claims.role,
            resource = %resource,
            action = %action,
            "permission denied"
        );
        return Err(ServiceError::Forbidden {
            code: auth_codes::permission_denied(),
            message: format!("insufficient permissions for {resource}:{action}"),
        });
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn claims(role: &str, permissions: &[&str]) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            email: Some("user@yeelo.in".to_string()),
            name: None,
            role: Some(role.to_string()),
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
            is_super_admin: false,
            exp: u64::MAX,
            iat: 0,
            iss: None,
        }
    }

    fn app() -> Router {
        Router::new()
            .route("/sales", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn(require_permission(
                Resource::Sales,
                Action::Write,
            )))
    }

    async fn call(claims: Option<Claims>) -> StatusCode {
        let mut req = Request::builder().uri("/sales").body(Body::empty()).unwrap();
        if let Some(claims) = claims {
            req.extensions_mut().insert(claims);
        }
        app().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_cashier_can_write_sales() {
        assert_eq!(call(Some(claims("CASHIER", &[]))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_staff_is_forbidden() {
        assert_eq!(call(Some(claims("STAFF", &[]))).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_explicit_permission_grants() {
        assert_eq!(
            call(Some(claims("STAFF", &["sales:write"]))).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_claims_is_unauthorized() {
        assert_eq!(call(None).await, StatusCode::UNAUTHORIZED);
    }
}
