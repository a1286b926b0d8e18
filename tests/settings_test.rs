use std::fs;

use flipbook::ViewerConfig;
use flipbook::settings::{
    Settings, current_settings, load_settings_from_path, save_settings_to_path, set_settings,
};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn missing_file_is_created_with_defaults() {
    set_settings(Settings::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flipbook").join("config.yaml");

    load_settings_from_path(&path);

    assert!(path.exists());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("preload_batch_size: 2"));
    assert!(written.contains("preload_batch_delay_ms: 18"));
    assert_eq!(current_settings(), Settings::default());
}

#[test]
#[serial]
fn saved_settings_are_loaded_back() {
    set_settings(Settings::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    let custom = Settings {
        preload_enabled: false,
        preload_batch_size: 3,
        render_base_scale: 1.25,
        max_device_pixel_ratio: 3.0,
        cache_capacity: 64,
        ..Settings::default()
    };

    save_settings_to_path(&custom, &path);
    load_settings_from_path(&path);

    assert_eq!(current_settings(), custom);
    let config = ViewerConfig::from_settings(&current_settings());
    assert!(config.preload.is_none());
    assert_eq!(config.cache_capacity, 64);
    assert_eq!(config.render_scale.for_device_pixel_ratio(4.0), 3.75);
}

#[test]
#[serial]
fn malformed_file_keeps_previous_settings() {
    let previous = Settings {
        render_workers: 5,
        ..Settings::default()
    };
    set_settings(previous.clone());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "preload_batch_size: [not, a, number\n").unwrap();

    load_settings_from_path(&path);

    assert_eq!(current_settings(), previous);
}

#[test]
#[serial]
fn partial_file_is_normalized() {
    set_settings(Settings::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "version: 1\npreload_batch_size: 0\nrender_workers: 0\n").unwrap();

    load_settings_from_path(&path);

    let loaded = current_settings();
    assert_eq!(loaded.preload_batch_size, 1);
    assert_eq!(loaded.render_workers, 1);
    assert_eq!(loaded.cache_capacity, 512);
}
