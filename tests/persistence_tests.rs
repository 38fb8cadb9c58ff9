//! Key snapshot persistence across keymaster restarts.

#![cfg(feature = "server")]

use ggmp::client::keygen::write_key_file;
use ggmp::license_key::{KeyFile, DEFAULT_MAX_PLAYERS};
use ggmp::server::key_store::KeyStore;
use ggmp::server::keymaster::{Keymaster, RegisterKeyRequest};
use ggmp::server::usage::{RetentionPolicy, UsageTracker};

fn open(path: &std::path::Path) -> Keymaster {
    let store = KeyStore::load(path).expect("failed to open key store");
    Keymaster::new(store, UsageTracker::new(RetentionPolicy::unbounded()))
}

#[test]
fn keys_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");

    {
        let km = open(&path);
        for (key, max) in [("GGMP-1111-1111-1111-1111-1111", 10), ("GGMP-2222-2222-2222-2222-2222", 20)] {
            km.register_key(RegisterKeyRequest {
                key: Some(key.to_string()),
                max_players: Some(max),
                expires_at: Some("2099-01-01".to_string()),
                ..Default::default()
            })
            .unwrap();
        }
        km.revoke_key("GGMP-1111-1111-1111-1111-1111").unwrap();
    }

    let km = open(&path);
    assert_eq!(km.active_keys().unwrap(), 1);

    let record = km
        .validate(Some("GGMP-2222-2222-2222-2222-2222"), None)
        .unwrap();
    assert_eq!(record.max_players, 20);
    assert_eq!(
        record.expires_at.unwrap().to_rfc3339(),
        "2099-01-01T00:00:00+00:00"
    );
    assert!(km.validate(Some("GGMP-1111-1111-1111-1111-1111"), None).is_err());
}

#[test]
fn usage_logs_do_not_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    let key = "GGMP-3333-3333-3333-3333-3333";

    {
        let km = open(&path);
        km.register_key(RegisterKeyRequest {
            key: Some(key.to_string()),
            ..Default::default()
        })
        .unwrap();
        km.validate(Some(key), Some("10.0.0.1:30120".to_string()))
            .unwrap();
        assert_eq!(km.list_keys().unwrap()[0].usage.len(), 1);
    }

    let km = open(&path);
    assert!(km.list_keys().unwrap()[0].usage.is_empty());
}

#[test]
fn generated_key_file_can_seed_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keymaster-keys.json");
    let file = KeyFile::generate(3, "Seeded Server");
    write_key_file(&file, &path).unwrap();

    let km = open(&path);
    assert_eq!(km.active_keys().unwrap(), 3);

    let record = km.validate(Some(file.keys[1].key.as_str()), None).unwrap();
    assert_eq!(record.server_name, "Seeded Server");
    assert_eq!(record.max_players, DEFAULT_MAX_PLAYERS);
    assert_eq!(record.registered, file.keys[1].generated);
}

#[test]
fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let err = KeyStore::load(&path).unwrap_err();
    assert!(err.is_internal());
}
