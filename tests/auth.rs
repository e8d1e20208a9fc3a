use actix_web::{dev::Payload, test, FromRequest};
use classlink::{
    auth::{create_jwt, hash_password, hash_reset_token, new_reset_token, verify_password, Auth, Claims, Role},
    error::ApiError,
    require_role,
};
use std::env;

// Helper that guarantees a sufficiently long secret for tests.
fn set_secret() {
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

#[actix_web::test]
async fn jwt_roundtrip_ok() {
    set_secret();
    let token = create_jwt("user-1", Role::Teacher, "sess-1").expect("token");
    // The Auth extractor is the public way to validate, so use it here.
    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.0.sub, "user-1");
    assert_eq!(auth.0.role, Role::Teacher);
    assert_eq!(auth.0.jti, "sess-1");
}

#[actix_web::test]
async fn extractor_rejects_invalid_token() {
    set_secret();
    let req = test::TestRequest::default()
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn extractor_rejects_missing_header() {
    set_secret();
    let req = test::TestRequest::default().to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn expired_token_rejected() {
    set_secret();
    // Two hours past expiry, well beyond the validator's leeway.
    let claims = Claims {
        sub: "user-1".into(),
        exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize,
        role: Role::Parent,
        jti: "sess-old".into(),
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret("test-secret-must-be-32-bytes-long!!".as_ref()),
    )
    .expect("encode");

    let req = test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    // Build Auth instances manually with different roles.
    let teacher = Auth(Claims {
        sub: "t1".into(),
        exp: usize::MAX,
        role: Role::Teacher,
        jti: "s1".into(),
    });
    let parent = Auth(Claims {
        sub: "p1".into(),
        exp: usize::MAX,
        role: Role::Parent,
        jti: "s2".into(),
    });

    fn guarded(a: Auth) -> Result<(), ApiError> {
        require_role!(a, Role::Teacher);
        Ok(())
    }
    assert!(guarded(teacher).is_ok());
    assert!(matches!(guarded(parent), Err(ApiError::Forbidden)));
}

#[std::prelude::v1::test]
fn password_hash_roundtrip() {
    let hash = hash_password("correct horse battery").expect("hash");
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("correct horse battery", &hash));
    assert!(!verify_password("wrong password", &hash));
    // Garbage stored hash must fail closed, not panic.
    assert!(!verify_password("anything", "not-a-phc-string"));
}

#[std::prelude::v1::test]
fn reset_tokens_are_unique_and_hash_deterministically() {
    let (token_a, hash_a) = new_reset_token();
    let (token_b, hash_b) = new_reset_token();
    assert_ne!(token_a, token_b);
    assert_ne!(hash_a, hash_b);

    // 32 random bytes, hex encoded
    assert_eq!(token_a.len(), 64);
    assert!(token_a.chars().all(|c| c.is_ascii_hexdigit()));

    // the stored digest is reproducible from the plaintext alone
    assert_eq!(hash_reset_token(&token_a), hash_a);
    assert_eq!(hash_a.len(), 64);
}
