// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn credentials_from_json_keeps_string_fields() {
    let creds = Credentials::from_json(r#"{"token": "abc", "region": "us-west-2", "n": 3}"#)
        .unwrap();
    assert_eq!(creds.get("token"), Some("abc"));
    assert_eq!(creds.get("region"), Some("us-west-2"));
    // Non-string values are dropped, not errors.
    assert_eq!(creds.get("n"), None);
}

#[test]
fn credentials_from_json_rejects_non_object() {
    assert!(Credentials::from_json("[1,2]").is_err());
    assert!(Credentials::from_json("not json").is_err());
}

#[tokio::test]
#[serial]
async fn env_source_prefers_env_var() {
    std::env::set_var("LANDFORM_CREDENTIALS", r#"{"token": "from-env"}"#);
    let creds = EnvCredentialSource.load().await.unwrap();
    assert_eq!(creds.get("token"), Some("from-env"));
    std::env::remove_var("LANDFORM_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn env_source_falls_back_to_dotfile() {
    std::env::remove_var("LANDFORM_CREDENTIALS");
    let home = tempfile::tempdir().unwrap();
    let old_home = std::env::var("HOME").ok();
    std::env::set_var("HOME", home.path());

    std::fs::create_dir_all(home.path().join(".landform")).unwrap();
    std::fs::write(
        home.path().join(".landform/credentials.json"),
        r#"{"token": "from-file"}"#,
    )
    .unwrap();

    let creds = EnvCredentialSource.load().await.unwrap();
    assert_eq!(creds.get("token"), Some("from-file"));

    if let Some(home) = old_home {
        std::env::set_var("HOME", home);
    }
}

#[tokio::test]
#[serial]
async fn env_source_missing_everything_is_not_found() {
    std::env::remove_var("LANDFORM_CREDENTIALS");
    let home = tempfile::tempdir().unwrap();
    let old_home = std::env::var("HOME").ok();
    std::env::set_var("HOME", home.path());

    assert!(matches!(EnvCredentialSource.load().await, Err(CredentialError::NotFound)));

    if let Some(home) = old_home {
        std::env::set_var("HOME", home);
    }
}

#[tokio::test]
async fn fake_source_counts_and_rotates() {
    let source = FakeCredentialSource::new();
    let first = source.load().await.unwrap();
    let second = source.load().await.unwrap();
    assert_ne!(first.get("token"), second.get("token"));
    assert_eq!(source.load_count(), 2);

    source.fail_next(true);
    assert!(source.load().await.is_err());
}
