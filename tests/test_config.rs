use std::io::Write;

use missive::config::{CONFIG_ENV, Config, LOG_ENV};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.iter_chunk_size, 512);
    assert_eq!(cfg.content_chunk_size, 10 * 1024);
    assert_eq!(cfg.default_headers.get("Accept").map(String::as_str), Some("*/*"));
    assert!(cfg.default_headers["User-Agent"].starts_with("missive/"));
}

#[test]
fn test_config_from_yaml_fills_missing_fields() {
    let cfg = Config::from_yaml("log_level: debug\niter_chunk_size: 64\n").unwrap();
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.iter_chunk_size, 64);
    assert_eq!(cfg.content_chunk_size, Config::default().content_chunk_size);
}

#[test]
fn test_config_from_empty_yaml() {
    assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
}

#[test]
fn test_config_headers_replace_defaults() {
    let cfg = Config::from_yaml("default_headers:\n  X-Team: core\n").unwrap();
    assert_eq!(cfg.default_headers.len(), 1);
    assert_eq!(cfg.default_headers["X-Team"], "core");
}

#[test]
fn test_config_rejects_bad_yaml() {
    assert!(Config::from_yaml("iter_chunk_size: lots").is_err());
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_level: warn").unwrap();
    writeln!(file, "content_chunk_size: 2048").unwrap();

    let cfg = Config::load_from(Some(file.path()), None).unwrap();
    assert_eq!(cfg.log_level, "warn");
    assert_eq!(cfg.content_chunk_size, 2048);

    let cfg = Config::load_from(Some(file.path()), Some("trace".to_string())).unwrap();
    assert_eq!(cfg.log_level, "trace");
}

#[test]
fn test_config_blank_log_override_is_ignored() {
    let cfg = Config::load_from(None, Some("   ".to_string())).unwrap();
    assert_eq!(cfg.log_level, "info");
}

#[test]
fn test_config_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    let err = Config::load_from(Some(&missing), None).unwrap_err();
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn test_config_load_reads_environment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "iter_chunk_size: 32").unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, file.path());
        std::env::set_var(LOG_ENV, "debug");
    }
    let cfg = Config::load().unwrap();
    unsafe {
        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var(LOG_ENV);
    }

    assert_eq!(cfg.iter_chunk_size, 32);
    assert_eq!(cfg.log_level, "debug");
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1, cfg2);
}
