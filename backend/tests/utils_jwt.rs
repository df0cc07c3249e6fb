use chrono::Duration;
use gatekeeper_backend::{
    models::user::User,
    types::{BranchId, RoleId, SessionId, UserId},
    utils::jwt::{
        create_access_token, decode_access_token_ignoring_expiry, encode_claims,
        verify_access_token, Claims,
    },
};

fn user() -> User {
    User::new(UserId(42), "testuser", "hash", RoleId(2), BranchId(1))
}

#[test]
fn jwt_create_and_verify_access_token() {
    let (token, claims) = create_access_token(
        &user(),
        BranchId(1),
        SessionId(9),
        "testsecret",
        Duration::minutes(30),
    )
    .expect("create token");

    assert!(!token.is_empty());
    assert_eq!(claims.sub, "42");
    assert_eq!(claims.username, "testuser");
    assert_eq!(claims.role_id, RoleId(2));

    let actor = verify_access_token(&token, "testsecret")
        .expect("verify")
        .actor()
        .expect("numeric subject");
    assert_eq!(actor.user_id, UserId(42));
    assert_eq!(actor.session_id, SessionId(9));
}

#[test]
fn jwt_verify_with_wrong_secret_fails() {
    let (token, _) = create_access_token(
        &user(),
        BranchId(1),
        SessionId(9),
        "secret1",
        Duration::minutes(30),
    )
    .expect("create token");

    assert!(verify_access_token(&token, "secret2").is_err());
}

#[test]
fn jwt_expired_token_fails_verification() {
    let expired = Claims::new(&user(), BranchId(1), SessionId(9), Duration::hours(-1));
    let token = encode_claims(&expired, "secret").expect("encode token");

    assert!(verify_access_token(&token, "secret").is_err());
    let decoded = decode_access_token_ignoring_expiry(&token, "secret").expect("signature ok");
    assert_eq!(decoded.jti, expired.jti);
}

#[test]
fn jwt_ids_are_unique_per_token() {
    let first = Claims::new(&user(), BranchId(1), SessionId(9), Duration::minutes(5));
    let second = Claims::new(&user(), BranchId(1), SessionId(9), Duration::minutes(5));
    assert_ne!(first.jti, second.jti);
}

#[test]
fn non_numeric_subject_has_no_actor() {
    let mut claims = Claims::new(&user(), BranchId(1), SessionId(9), Duration::minutes(5));
    claims.sub = "user-123".to_string();
    assert!(claims.user_id().is_none());
    assert!(claims.actor().is_none());
}
