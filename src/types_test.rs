use super::*;

// =============================================================================
// Identity
// =============================================================================

#[test]
fn identity_keeps_unknown_fields() {
    let json = serde_json::json!({
        "id": "u1",
        "email": "a@x.com",
        "user_metadata": { "name": "Ann" },
        "aud": "authenticated"
    });
    let identity: Identity = serde_json::from_value(json).unwrap();
    assert_eq!(identity.id, "u1");
    assert_eq!(identity.email.as_deref(), Some("a@x.com"));
    assert_eq!(identity.extra["user_metadata"]["name"], "Ann");

    let back = serde_json::to_value(&identity).unwrap();
    assert_eq!(back["aud"], "authenticated");
}

#[test]
fn identity_without_email() {
    let identity: Identity = serde_json::from_value(serde_json::json!({ "id": "u1" })).unwrap();
    assert!(identity.email.is_none());
    let back = serde_json::to_value(&identity).unwrap();
    assert!(back.get("email").is_none());
}

#[test]
fn identity_builder_sets_email() {
    let identity = Identity::new("u1").with_email("a@x.com");
    assert_eq!(identity.id, "u1");
    assert_eq!(identity.email.as_deref(), Some("a@x.com"));
}

// =============================================================================
// Profile
// =============================================================================

#[test]
fn profile_null_name_is_none() {
    let profile: Profile =
        serde_json::from_value(serde_json::json!({ "id": "u1", "name": null, "avatar_url": "x" })).unwrap();
    assert!(profile.name.is_none());
    assert_eq!(profile.fields["avatar_url"], "x");
}

#[test]
fn profile_requires_id() {
    let result = serde_json::from_value::<Profile>(serde_json::json!({ "name": "Ann" }));
    assert!(result.is_err());
}

// =============================================================================
// Session
// =============================================================================

fn session(expires_at: Option<u64>) -> Session {
    Session {
        access_token: "at".into(),
        refresh_token: "rt".into(),
        token_type: "bearer".into(),
        expires_in: Some(3600),
        expires_at,
        user: Identity::new("u1"),
    }
}

#[test]
fn session_expiry_boundary() {
    let s = session(Some(100));
    assert!(!s.is_expired(99));
    assert!(s.is_expired(100));
    assert!(s.is_expired(101));
}

#[test]
fn session_without_expiry_never_expires() {
    assert!(!session(None).is_expired(u64::MAX));
}

#[test]
fn session_token_type_defaults_to_bearer() {
    let s: Session = serde_json::from_value(serde_json::json!({
        "access_token": "at",
        "refresh_token": "rt",
        "user": { "id": "u1" }
    }))
    .unwrap();
    assert_eq!(s.token_type, "bearer");
    assert!(s.expires_at.is_none());
}
