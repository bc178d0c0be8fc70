//! Run configuration
//!
//! Credentials, the client list and the posting location come from a JSON
//! file (or TOML when the path ends in `.toml`). Race tunables and API
//! endpoints are optional tables with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::{Credentials, Location};

/// Configuration errors, all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration file! Missing field `{0}`")]
    MissingField(&'static str),

    #[error("Cannot instantiate any client without API ID and Secret")]
    NoClients,

    #[error("Invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Configuration file as written by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub clients: Option<Vec<ClientConfig>>,

    /// Community to post in; `sr`, `sub` and `r/` are accepted spellings
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub sr: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, rename = "r/")]
    pub r_slash: Option<String>,

    #[serde(default)]
    pub race: RaceConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

/// One registered API app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    pub secret: String,

    /// How many workers share this app
    #[serde(default = "default_repeat")]
    pub repeat: i64,
}

/// Race tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Gating ends once the target is this close to the stream head
    #[serde(default = "default_min_distance")]
    pub min_distance: i64,

    /// Divisor turning a distance into seconds of sleep
    #[serde(default = "default_sleep_divisor")]
    pub sleep_divisor: f64,

    /// Upper bound for a single gating sleep
    #[serde(default = "default_max_sleep_secs")]
    pub max_sleep_secs: f64,

    /// How far ahead of the stream head watch mode suggests a target
    #[serde(default = "default_forecast_offset")]
    pub forecast_offset: u64,

    /// Stream entries read per poll
    #[serde(default = "default_poll_limit")]
    pub poll_limit: usize,

    /// Delay between worker launches
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Delay before re-submitting while the target is ahead (0 = immediate)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Estimate the arrival time while gating
    #[serde(default = "default_true")]
    pub forecast: bool,

    /// Body of racing posts
    #[serde(default = "default_placeholder_body")]
    pub placeholder_body: String,

    /// Body written to the post that wins the target
    #[serde(default = "default_claim_body")]
    pub claim_body: String,
}

impl RaceConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject tunables that would stall gating or turn it into a busy loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "race.poll_limit",
                reason: "must be at least 1",
            });
        }
        if self.min_distance <= 0 {
            return Err(ConfigError::Invalid {
                field: "race.min_distance",
                reason: "must be positive",
            });
        }
        if !(self.sleep_divisor.is_finite() && self.sleep_divisor > 0.0) {
            return Err(ConfigError::Invalid {
                field: "race.sleep_divisor",
                reason: "must be a positive number",
            });
        }
        if !(self.max_sleep_secs.is_finite() && self.max_sleep_secs > 0.0) {
            return Err(ConfigError::Invalid {
                field: "race.max_sleep_secs",
                reason: "must be a positive number",
            });
        }
        Ok(())
    }
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            min_distance: default_min_distance(),
            sleep_divisor: default_sleep_divisor(),
            max_sleep_secs: default_max_sleep_secs(),
            forecast_offset: default_forecast_offset(),
            poll_limit: default_poll_limit(),
            stagger_ms: default_stagger_ms(),
            retry_delay_ms: 0,
            forecast: true,
            placeholder_body: default_placeholder_body(),
            claim_body: default_claim_body(),
        }
    }
}

/// API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Community whose newest posts show the stream head
    #[serde(default = "default_stream")]
    pub stream: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            stream: default_stream(),
        }
    }
}

// Defaults
fn default_repeat() -> i64 { 1 }
fn default_min_distance() -> i64 { 270 }
fn default_sleep_divisor() -> f64 { 200.0 }
fn default_max_sleep_secs() -> f64 { 10.0 }
fn default_forecast_offset() -> u64 { 1500 }
fn default_poll_limit() -> usize { 2 }
fn default_stagger_ms() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_placeholder_body() -> String { "This is not the one".to_string() }
fn default_claim_body() -> String { "You did it! You did it!".to_uppercase() }
fn default_auth_url() -> String { "https://www.reddit.com".to_string() }
fn default_api_url() -> String { "https://oauth.reddit.com".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_stream() -> String { "all".to_string() }

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub user_agent: String,
    /// Clients in file order, each repeated `repeat` times
    pub clients: Vec<ClientConfig>,
    pub location: Location,
    pub race: RaceConfig,
    pub platform: PlatformConfig,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let file: FileConfig = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        Self::from_file(file)
    }

    /// Validate a parsed configuration file.
    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        let username = file.username.ok_or(ConfigError::MissingField("username"))?;
        let password = file.password.ok_or(ConfigError::MissingField("password"))?;
        let user_agent = file.user_agent.ok_or(ConfigError::MissingField("user_agent"))?;
        let clients = file.clients.ok_or(ConfigError::MissingField("clients"))?;
        if clients.is_empty() {
            return Err(ConfigError::NoClients);
        }

        let expanded: Vec<ClientConfig> = clients
            .iter()
            .flat_map(|client| {
                let repeat = client.repeat.max(0) as usize;
                std::iter::repeat(client.clone()).take(repeat)
            })
            .collect();
        if expanded.is_empty() {
            return Err(ConfigError::NoClients);
        }

        file.race.validate()?;

        let community = [file.subreddit, file.sr, file.sub, file.r_slash]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty());
        let location = match community {
            Some(name) => Location::Community(name),
            None => Location::UserProfile(username.clone()),
        };

        Ok(Self {
            username,
            password,
            user_agent,
            clients: expanded,
            location,
            race: file.race,
            platform: file.platform,
        })
    }

    /// Credentials for one configured client.
    pub fn credentials(&self, client: &ClientConfig) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            user_agent: self.user_agent.clone(),
            client_id: client.id.clone(),
            client_secret: client.secret.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FileConfig {
        FileConfig {
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            user_agent: Some("rig/0.1".to_string()),
            clients: Some(vec![ClientConfig {
                id: "one".to_string(),
                secret: "s1".to_string(),
                repeat: 1,
            }]),
            ..FileConfig::default()
        }
    }

    #[test]
    fn test_missing_fields() {
        let mut file = base();
        file.password = None;
        assert!(matches!(
            Config::from_file(file),
            Err(ConfigError::MissingField("password"))
        ));

        let mut file = base();
        file.clients = None;
        assert!(matches!(
            Config::from_file(file),
            Err(ConfigError::MissingField("clients"))
        ));
    }

    #[test]
    fn test_empty_clients() {
        let mut file = base();
        file.clients = Some(vec![]);
        assert!(matches!(Config::from_file(file), Err(ConfigError::NoClients)));
    }

    #[test]
    fn test_repeat_expansion() {
        let mut file = base();
        file.clients = Some(vec![
            ClientConfig { id: "one".to_string(), secret: "s1".to_string(), repeat: 3 },
            ClientConfig { id: "two".to_string(), secret: "s2".to_string(), repeat: -4 },
            ClientConfig { id: "three".to_string(), secret: "s3".to_string(), repeat: 1 },
        ]);
        let config = Config::from_file(file).unwrap();
        let ids: Vec<&str> = config.clients.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["one", "one", "one", "three"]);
    }

    #[test]
    fn test_all_repeats_zero() {
        let mut file = base();
        if let Some(clients) = file.clients.as_mut() {
            clients[0].repeat = 0;
        }
        assert!(matches!(Config::from_file(file), Err(ConfigError::NoClients)));
    }

    #[test]
    fn test_location_precedence() {
        let config = Config::from_file(base()).unwrap();
        assert_eq!(config.location, Location::UserProfile("alice".to_string()));

        let mut file = base();
        file.sub = Some("third".to_string());
        file.sr = Some(String::new());
        file.r_slash = Some("fourth".to_string());
        let config = Config::from_file(file).unwrap();
        assert_eq!(config.location, Location::Community("third".to_string()));
    }

    #[test]
    fn test_race_defaults() {
        let race = RaceConfig::default();
        assert_eq!(race.min_distance, 270);
        assert_eq!(race.forecast_offset, 1500);
        assert_eq!(race.stagger(), Duration::from_millis(300));
        assert_eq!(race.retry_delay(), Duration::ZERO);
        assert_eq!(race.claim_body, "YOU DID IT! YOU DID IT!");
        assert!(race.validate().is_ok());
    }

    fn invalid_field(race: RaceConfig) -> Option<&'static str> {
        let mut file = base();
        file.race = race;
        match Config::from_file(file) {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_rejects_zero_poll_limit() {
        let race = RaceConfig { poll_limit: 0, ..RaceConfig::default() };
        assert_eq!(invalid_field(race), Some("race.poll_limit"));
    }

    #[test]
    fn test_rejects_non_positive_min_distance() {
        for min_distance in [0, -270] {
            let race = RaceConfig { min_distance, ..RaceConfig::default() };
            assert_eq!(invalid_field(race), Some("race.min_distance"));
        }
    }

    #[test]
    fn test_rejects_bad_sleep_divisor() {
        for sleep_divisor in [0.0, -200.0, f64::NAN, f64::INFINITY] {
            let race = RaceConfig { sleep_divisor, ..RaceConfig::default() };
            assert_eq!(invalid_field(race), Some("race.sleep_divisor"));
        }
    }

    #[test]
    fn test_rejects_bad_max_sleep() {
        for max_sleep_secs in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let race = RaceConfig { max_sleep_secs, ..RaceConfig::default() };
            assert_eq!(invalid_field(race), Some("race.max_sleep_secs"));
        }
    }
}
