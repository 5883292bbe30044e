//! Loading `config.toml` from disk the way the binary does.

use std::fs;

use venered_cli::config::{expand_config_path, CLIConfiguration};
use venered_cli::CLIError;

#[test]
fn test_full_file_loads_every_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
url = "https://demo.supabase.co"
api_key = "anon"
timeout = 10

[connection]
auto_reconnect = false
max_reconnect_attempts = 3

[auth]
email = "me@example.com"
password = "secret"

[upload]
imgbb_key = "img-key"

[logging]
level = "venered_link=debug"
"#,
    )
    .unwrap();

    let config = CLIConfiguration::load_file(&path).unwrap();
    assert_eq!(config.server.api_key.as_deref(), Some("anon"));
    assert_eq!(config.server.timeout, 10);
    assert_eq!(config.server.max_retries, 3);
    assert_eq!(config.auth.password.as_deref(), Some("secret"));
    assert_eq!(config.upload.imgbb_key.as_deref(), Some("img-key"));
    assert_eq!(config.logging.level, "venered_link=debug");

    let options = config.to_connection_options();
    assert!(!options.auto_reconnect);
    assert_eq!(options.max_reconnect_attempts, Some(3));
}

#[test]
fn test_malformed_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[server\nurl = ").unwrap();

    match CLIConfiguration::load_file(&path) {
        Err(CLIError::ConfigurationError(msg)) => assert!(msg.contains("TOML parse error")),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_absolute_path_is_untouched() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(expand_config_path(dir.path()), dir.path().to_path_buf());
}
