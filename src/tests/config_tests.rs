use std::collections::HashMap;
use std::env;
use std::fs;

use tempfile::TempDir;

use crate::config::{self, AppConfig};

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.database.url, "sqlite://data/dateiwerk.db");
    assert_eq!(config.volume.name, "files");
    assert_eq!(config.volume.path, "./files");
    assert!(config.volume.excludes.is_empty());
    assert_eq!(config.extensions.dir, "./extensions");
    assert!(config.auth.users.is_empty());
    assert!(config.security.is_none());
    assert!(config::validate(&config).is_ok());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.server.port = 0;
    assert!(config::validate(&config).unwrap_err().to_string().contains("invalid server.port"));

    let mut config = AppConfig::default();
    config.volume.path = "  ".into();
    assert!(config::validate(&config).is_err());

    let mut config = AppConfig::default();
    config.volume.excludes = vec!["[unclosed".into()];
    assert!(config::validate(&config).unwrap_err().to_string().contains("volume.excludes"));

    let mut config = AppConfig::default();
    config.auth.users = HashMap::from([("alice".to_string(), "short".to_string())]);
    assert!(config::validate(&config).unwrap_err().to_string().contains("alice"));
}

// Environment variables are process-wide, so every env-driven case lives in
// this one test.
#[test]
fn test_load_layers_file_and_env() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[server]
port = 9000

[volume]
name = "D:"
path = "/srv/files"
excludes = ["*.tmp", "**/.git"]

[auth.users]
alice = "alice-secret-token-0001"

[security]
enable_hsts = true
"#,
    )
    .unwrap();

    env::set_var("DATEIWERK_CONFIG", path.with_extension("").to_str().unwrap());
    env::set_var("DATEIWERK__SERVER__HOST", "0.0.0.0");
    let loaded = config::load();
    env::set_var("DATEIWERK__SERVER__PORT", "0");
    let invalid = config::load();
    env::remove_var("DATEIWERK__SERVER__PORT");
    env::remove_var("DATEIWERK__SERVER__HOST");
    env::remove_var("DATEIWERK_CONFIG");

    let config = loaded.unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.volume.name, "D:");
    assert_eq!(config.volume.path, "/srv/files");
    assert_eq!(config.volume.excludes.len(), 2);
    assert_eq!(config.auth.users.get("alice").map(String::as_str), Some("alice-secret-token-0001"));
    assert_eq!(config.security.and_then(|s| s.enable_hsts), Some(true));
    // untouched sections keep the embedded defaults
    assert_eq!(config.extensions.dir, "./extensions");

    assert!(invalid.is_err());
}

#[test]
fn test_ensure_sqlite_parent_dir_creates_directory() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("data").join("app.db");
    let url = format!("sqlite://{}", db_path.display());
    config::ensure_sqlite_parent_dir(&url).unwrap();
    assert!(db_path.parent().unwrap().is_dir());
}
