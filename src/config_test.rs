use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn from_lookup_applies_defaults() {
    let cfg = AuthConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://abc.supabase.co"),
        ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap();

    assert_eq!(cfg.supabase_url, "https://abc.supabase.co");
    assert_eq!(cfg.anon_key, "anon");
    assert_eq!(cfg.storage_dir, PathBuf::from(DEFAULT_STORAGE_DIR));
    assert_eq!(cfg.timeouts, Timeouts::default());
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = AuthConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "http://localhost:54321/"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("AUTH_STORAGE_DIR", "/tmp/auth"),
        ("AUTH_REQUEST_TIMEOUT_SECS", "42"),
        ("AUTH_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();

    assert_eq!(cfg.supabase_url, "http://localhost:54321");
    assert_eq!(cfg.storage_dir, PathBuf::from("/tmp/auth"));
    assert_eq!(cfg.timeouts, Timeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn from_lookup_bad_timeout_falls_back() {
    let cfg = AuthConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://abc.supabase.co"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("AUTH_REQUEST_TIMEOUT_SECS", "soon"),
    ]))
    .unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
}

#[test]
fn from_lookup_missing_url_errors() {
    let err = AuthConfig::from_lookup(lookup_from(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing { var: "SUPABASE_URL" }));
}

#[test]
fn from_lookup_blank_key_is_missing() {
    let err = AuthConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://abc.supabase.co"),
        ("SUPABASE_ANON_KEY", "  "),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("SUPABASE_ANON_KEY"));
}

#[test]
fn from_lookup_rejects_non_http_url() {
    let err = AuthConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "abc.supabase.co"),
        ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { var: "SUPABASE_URL", .. }));
}
