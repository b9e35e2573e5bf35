//! Integration tests for configuration files
//!
//! Tests loading, saving and validation of `bridge.toml`.

use bridge::config::BridgeConfig;
use std::fs;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[bridge]
log_level = "debug"

[printer]
vendor_id = "0x04b8"
product_id = "0x0202"

[usb]
hotplug = false
"#;

#[test]
fn test_load_full_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = BridgeConfig::load(Some(path)).unwrap();
    assert_eq!(config.bridge.log_level, "debug");
    assert!(!config.usb.hotplug);
    assert_eq!(config.printer_identity().unwrap(), Some((0x04b8, 0x0202)));
}

#[test]
fn test_load_empty_config_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    fs::write(&path, "").unwrap();

    let config = BridgeConfig::load(Some(path)).unwrap();
    assert_eq!(config, BridgeConfig::default());
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    // parent directories are created on save
    let path = dir.path().join("nested").join("bridge.toml");

    let mut config = BridgeConfig::default();
    config.printer.vendor_id = Some("0x0416".to_string());
    config.printer.product_id = Some("0x5011".to_string());
    config.save(&path).unwrap();

    let reloaded = BridgeConfig::load(Some(path)).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_saved_defaults_omit_printer_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    BridgeConfig::default().save(&path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("log_level = \"info\""));
    assert!(content.contains("hotplug = true"));
    assert!(!content.contains("vendor_id"));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(BridgeConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        // unknown log level
        "[bridge]\nlog_level = \"loud\"\n",
        // id without 0x prefix
        "[printer]\nvendor_id = \"04b8\"\nproduct_id = \"0x0202\"\n",
        // vendor without product
        "[printer]\nvendor_id = \"0x04b8\"\n",
        // wrong type
        "[usb]\nhotplug = \"yes\"\n",
        // not TOML
        "[bridge\n",
    ];

    let dir = tempdir().unwrap();
    for (i, content) in cases.iter().enumerate() {
        let path = dir.path().join(format!("case{}.toml", i));
        fs::write(&path, content).unwrap();
        assert!(
            BridgeConfig::load(Some(path)).is_err(),
            "config accepted: {:?}",
            content
        );
    }
}

#[test]
fn test_invalid_file_at_standard_location_is_an_error() {
    let dir = tempdir().unwrap();
    let user = dir.path().join("user").join("bridge.toml");
    let system = dir.path().join("system").join("bridge.toml");
    fs::create_dir_all(user.parent().unwrap()).unwrap();
    fs::create_dir_all(system.parent().unwrap()).unwrap();
    fs::write(
        &user,
        "[bridge]\nlog_level = \"verbose\"\n\n[printer]\nvendor_id = \"0x04b8\"\nproduct_id = \"0x0202\"\n",
    )
    .unwrap();
    fs::write(&system, FULL_CONFIG).unwrap();

    // the first existing file wins, even when a later one is valid
    let err = BridgeConfig::load_first(&[user.clone(), system.clone()]).unwrap_err();
    assert!(format!("{:#}", err).contains("verbose"));

    fs::remove_file(&user).unwrap();
    let config = BridgeConfig::load_first(&[user, system]).unwrap();
    assert_eq!(config.printer_identity().unwrap(), Some((0x04b8, 0x0202)));
}

#[test]
fn test_no_file_at_standard_locations_uses_defaults() {
    let dir = tempdir().unwrap();
    let paths = [dir.path().join("a.toml"), dir.path().join("b.toml")];
    assert_eq!(BridgeConfig::load_first(&paths).unwrap(), BridgeConfig::default());
}
