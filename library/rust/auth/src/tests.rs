use secrecy::SecretString;

use crate::verifier::{extract_bearer_token, extract_cookie_token};
use crate::{AuthError, Claims, JwtVerifier};

fn verifier(issuer: Option<&str>) -> JwtVerifier {
    JwtVerifier::new(
        SecretString::new("test-secret-key-for-hs256".to_string()),
        issuer.map(String::from),
    )
}

fn claims_expiring_in(secs: i64, iss: Option<&str>) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: "user-42".into(),
        email: Some("cashier@yeelo.example".into()),
        name: Some("Counter 1".into()),
        role: Some("CASHIER".into()),
        permissions: vec![],
        is_super_admin: false,
        exp: u64::try_from(now + secs).unwrap(),
        iat: u64::try_from(now).unwrap(),
        iss: iss.map(String::from),
    }
}

#[test]
fn test_sign_and_verify_token() {
    let v = verifier(Some("yeelo-erp"));
    let token = v.sign(&claims_expiring_in(3600, Some("yeelo-erp"))).unwrap();

    let claims = v.verify_token(&token).unwrap();
    assert_eq!(claims.sub, "user-42");
    assert_eq!(claims.role.as_deref(), Some("CASHIER"));
    assert_eq!(claims.actor(), "cashier@yeelo.example");
}

#[test]
fn test_verify_expired_token() {
    let v = verifier(None);
    let token = v.sign(&claims_expiring_in(-120, None)).unwrap();

    let err = v.verify_token(&token).unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));
}

#[test]
fn test_verify_wrong_issuer() {
    let v = verifier(Some("yeelo-erp"));
    let token = v.sign(&claims_expiring_in(3600, Some("someone-else"))).unwrap();

    let err = v.verify_token(&token).unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[test]
fn test_verify_wrong_secret() {
    let signer = JwtVerifier::new(SecretString::new("other-secret".to_string()), None);
    let token = signer.sign(&claims_expiring_in(3600, None)).unwrap();

    let err = verifier(None).verify_token(&token).unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[test]
fn test_verify_garbage_token() {
    let err = verifier(None).verify_token("not-a-jwt").unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[test]
fn test_claims_accept_camel_case_super_admin() {
    let json = r#"{"sub":"u1","exp":9999999999,"isSuperAdmin":true}"#;
    let claims: Claims = serde_json::from_str(json).unwrap();
    assert!(claims.is_super_admin);
    assert!(claims.permissions.is_empty());
    assert_eq!(claims.actor(), "u1");
}

#[test]
fn test_extract_bearer_token() {
    assert_eq!(extract_bearer_token("Bearer abc.def").unwrap(), "abc.def");
    assert!(matches!(
        extract_bearer_token("Basic Zm9v"),
        Err(AuthError::InvalidAuthHeader)
    ));
    assert!(matches!(
        extract_bearer_token("Bearer "),
        Err(AuthError::InvalidAuthHeader)
    ));
}

#[test]
fn test_extract_cookie_token() {
    let header = "theme=dark; auth-token=abc.def; lang=en";
    assert_eq!(extract_cookie_token(header, "auth-token"), Some("abc.def"));
    assert_eq!(extract_cookie_token(header, "missing"), None);
    assert_eq!(extract_cookie_token("auth-token=", "auth-token"), None);
}
