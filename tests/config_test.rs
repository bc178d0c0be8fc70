//! Config file loading integration tests

use std::io::Write;

use rig::config::{Config, ConfigError};
use rig::platform::Location;
use tempfile::{Builder, NamedTempFile};

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_json_config_with_defaults() {
    let file = write_config(
        ".json",
        r#"{
            "username": "alice",
            "password": "hunter2",
            "user_agent": "rig/0.1 by alice",
            "clients": [
                {"id": "app-one", "secret": "s1", "repeat": 2},
                {"id": "app-two", "secret": "s2"}
            ]
        }"#,
    );

    let config = Config::load(file.path()).expect("valid config");

    assert_eq!(config.username, "alice");
    assert_eq!(config.clients.len(), 3);
    assert_eq!(config.location, Location::UserProfile("alice".to_string()));
    assert_eq!(config.race.min_distance, 270);
    assert_eq!(config.race.poll_limit, 2);
    assert_eq!(config.platform.api_url, "https://oauth.reddit.com");
    assert_eq!(config.platform.stream, "all");

    let credentials = config.credentials(&config.clients[2]);
    assert_eq!(credentials.client_id, "app-two");
    assert_eq!(credentials.user_agent, "rig/0.1 by alice");
}

#[test]
fn test_json_config_subreddit_aliases() {
    let file = write_config(
        ".json",
        r#"{
            "username": "alice",
            "password": "hunter2",
            "user_agent": "rig",
            "clients": [{"id": "a", "secret": "b"}],
            "r/": "mysub"
        }"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.location, Location::Community("mysub".to_string()));
}

#[test]
fn test_toml_config_with_race_overrides() {
    let file = write_config(
        ".toml",
        r#"
username = "bob"
password = "pw"
user_agent = "rig"
subreddit = "racing"

[[clients]]
id = "a"
secret = "b"
repeat = 4

[race]
min_distance = 100
stagger_ms = 0
retry_delay_ms = 25
forecast = false

[platform]
api_url = "http://localhost:8080"
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.clients.len(), 4);
    assert_eq!(config.location, Location::Community("racing".to_string()));
    assert_eq!(config.race.min_distance, 100);
    assert_eq!(config.race.stagger_ms, 0);
    assert_eq!(config.race.retry_delay_ms, 25);
    assert!(!config.race.forecast);
    assert_eq!(config.race.forecast_offset, 1500);
    assert_eq!(config.platform.api_url, "http://localhost:8080");
    assert_eq!(config.platform.auth_url, "https://www.reddit.com");
}

#[test]
fn test_missing_user_agent() {
    let file = write_config(
        ".json",
        r#"{"username": "a", "password": "b", "clients": [{"id": "c", "secret": "d"}]}"#,
    );
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::MissingField("user_agent"))
    ));
}

#[test]
fn test_empty_client_list() {
    let file = write_config(
        ".json",
        r#"{"username": "a", "password": "b", "user_agent": "c", "clients": []}"#,
    );
    assert!(matches!(Config::load(file.path()), Err(ConfigError::NoClients)));
}

#[test]
fn test_malformed_file() {
    let file = write_config(".json", "{ not json");
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("nope.json"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}
