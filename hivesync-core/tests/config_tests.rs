//! Config error-message and default-value integration tests.

use std::fs;
use std::path::PathBuf;

use hivesync_core::{
    config::{self, ClientConfig, DEFAULT_REMOVE_RETRIES, DEFAULT_REPLICAS},
    ConfigError, UserId,
};
use rstest::rstest;
use tempfile::TempDir;

fn write_raw(home: &TempDir, yaml: &str) {
    let path = config::config_path_at(home.path());
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(path, yaml).expect("write");
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = TempDir::new().expect("tempdir");
    write_raw(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn minimal_file_gets_defaults() {
    let home = TempDir::new().expect("tempdir");
    write_raw(&home, "user_id: alice\nstore_dir: /srv/hive\n");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.user_id, UserId::from("alice"));
    assert_eq!(loaded.store_dir, PathBuf::from("/srv/hive"));
    assert_eq!(loaded.replicas, DEFAULT_REPLICAS);
    assert_eq!(loaded.max_remove_retries, DEFAULT_REMOVE_RETRIES);
    assert!(!loaded.master);
    assert_eq!(loaded.settle_timeout(), None);
}

#[rstest]
#[case("user_id: alice\nstore_dir: /s\nmaster: true\n", true, DEFAULT_REMOVE_RETRIES)]
#[case("user_id: alice\nstore_dir: /s\nmax_remove_retries: 7\n", false, 7)]
#[case("user_id: alice\nstore_dir: /s\nmaster: false\nmax_remove_retries: 0\n", false, 0)]
fn explicit_fields_override_defaults(
    #[case] yaml: &str,
    #[case] master: bool,
    #[case] retries: u32,
) {
    let home = TempDir::new().expect("tempdir");
    write_raw(&home, yaml);
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.master, master);
    assert_eq!(loaded.max_remove_retries, retries);
}

#[test]
fn save_overwrites_previous_config() {
    let home = TempDir::new().expect("tempdir");
    let first = ClientConfig::new(UserId::from("alice"), PathBuf::from("/a"));
    config::save_at(home.path(), &first).expect("save first");

    let mut second = first.clone();
    second.store_dir = PathBuf::from("/b");
    second.replicas = 5;
    config::save_at(home.path(), &second).expect("save second");

    assert_eq!(config::load_at(home.path()).expect("load"), second);
}
