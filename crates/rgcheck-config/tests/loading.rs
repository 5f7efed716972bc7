use rgcheck_config::{load_config, ConfigError};
use rgcheck_domain::{LockLevel, SubscriptionId};
use std::io::Write;
use std::path::Path;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn load_json_fixture() {
    let cfg = load_config(&fixture("resource_groups.json")).expect("should load without error");
    assert_eq!(
        cfg.subscription_id,
        Some(SubscriptionId::new("00000000-0000-0000-0000-000000000001"))
    );
    let names: Vec<_> = cfg.resource_groups.keys().cloned().collect();
    assert_eq!(names, vec!["rg-app-dev", "rg-app-prod"], "sorted by name");

    let prod = &cfg.resource_groups["rg-app-prod"];
    assert_eq!(prod.expected_lock_level(), LockLevel::CanNotDelete);
    assert_eq!(prod.tags.get("costCenter").map(String::as_str), Some("1234"));
    assert!(cfg.resource_groups["rg-app-dev"].lock.is_none());
    assert!(cfg.access.allowed_role_names.contains("Contributor"));
}

#[test]
fn load_yaml_fixture() {
    let cfg = load_config(&fixture("resource_groups.yml")).expect("should load without error");
    assert!(cfg.subscription_id.is_none());
    let rg = &cfg.resource_groups["rg-shared"];
    assert_eq!(rg.location, "westeurope");
    assert_eq!(rg.expected_lock_level(), LockLevel::ReadOnly);
    assert_eq!(cfg.access.principal_id, "22222222-2222-2222-2222-222222222222");
}

#[test]
fn unsupported_extension_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "resourceGroups = {{}}").unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat { .. }), "got: {}", err);
}

#[test]
fn malformed_yaml_returns_error() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "resourceGroups: [unterminated").unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse { .. }), "got: {}", err);
}

#[test]
fn missing_file_returns_error() {
    let path = Path::new("/nonexistent/path/does/not/exist.json");
    assert!(matches!(load_config(path), Err(ConfigError::Io { .. })));
}
