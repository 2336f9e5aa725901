//! Configuration types.
//!
//! Settings come from an optional JSON file shaped like the bot's historical
//! `config.json`, overridden by environment variables. The result is built
//! once in `main` and handed to the components that need it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::directory::MAX_PAGE_SIZE;
use crate::error::ConfigError;

/// Default HTTP port (matches the original bot).
pub const DEFAULT_PORT: u16 = 3000;

/// Default prefix of the slash commands, e.g. `/leave-add`.
pub const DEFAULT_COMMAND_PREFIX: &str = "/leave-";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot user OAuth token (`xoxb-...`).
    pub bot_token: SecretString,
    /// Signing secret used to verify inbound requests.
    pub signing_secret: SecretString,
    /// Port the HTTP server binds on all interfaces.
    pub port: u16,
    /// Directory holding `channels.json` and `members.json`.
    pub data_dir: PathBuf,
    /// Period of the background directory refresh; zero disables it.
    pub directory_refresh_interval: Duration,
    /// Page size for channel listing.
    pub page_size: u32,
    /// Timeout applied to every Slack Web API call.
    pub http_timeout: Duration,
    /// Slash command prefix; the suffix selects the operation.
    pub command_prefix: String,
    /// Route of the Events API endpoint.
    pub events_route: String,
}

impl BotConfig {
    /// Config with the given secrets and defaults for everything else.
    pub fn new(bot_token: SecretString, signing_secret: SecretString) -> Self {
        Self {
            bot_token,
            signing_secret,
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("./data"),
            directory_refresh_interval: Duration::from_secs(3600),
            page_size: MAX_PAGE_SIZE,
            http_timeout: Duration::from_secs(10),
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            events_route: "/slack/events".to_string(),
        }
    }

    pub fn directory_path(&self) -> PathBuf {
        self.data_dir.join("channels.json")
    }

    pub fn members_path(&self) -> PathBuf {
        self.data_dir.join("members.json")
    }

    /// Load from `LEAVE_BOT_CONFIG` (or `./config.json` if present), then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("LEAVE_BOT_CONFIG") {
            Ok(path) => Some(FileConfig::read(Path::new(&path))?),
            Err(_) if Path::new("config.json").exists() => {
                Some(FileConfig::read(Path::new("config.json"))?)
            }
            Err(_) => None,
        };
        Self::resolve(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Merge a file config with environment lookups from `env`.
    fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bot_token = env("SLACK_BOT_TOKEN")
            .or(file.slack.token)
            .ok_or_else(|| ConfigError::MissingEnvVar("SLACK_BOT_TOKEN".into()))?;
        let signing_secret = env("SLACK_SIGNING_SECRET")
            .or(file.slack.signing_secret)
            .ok_or_else(|| ConfigError::MissingEnvVar("SLACK_SIGNING_SECRET".into()))?;

        let mut config = Self::new(
            SecretString::from(bot_token),
            SecretString::from(signing_secret),
        );

        if let Some(port) = parse_env(&env, "LEAVE_BOT_PORT")?.or(file.port) {
            config.port = port;
        }
        if let Some(dir) = env("LEAVE_BOT_DATA_DIR").or(file.data_dir) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_env::<u64>(&env, "LEAVE_BOT_DIRECTORY_REFRESH_SECS")? {
            config.directory_refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(&env, "LEAVE_BOT_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = parse_env::<u32>(&env, "LEAVE_BOT_PAGE_SIZE")? {
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(ConfigError::InvalidValue {
                    key: "LEAVE_BOT_PAGE_SIZE".into(),
                    message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
                });
            }
            config.page_size = size;
        }
        if let Some(prefix) = env("LEAVE_BOT_COMMAND_PREFIX") {
            config.command_prefix = prefix;
        }
        if let Some(route) = file.slack.events_route {
            if !route.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    key: "slack.events_route".into(),
                    message: "must start with '/'".into(),
                });
            }
            config.events_route = route;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// On-disk configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    slack: SlackSection,
    port: Option<u16>,
    data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackSection {
    token: Option<String>,
    signing_secret: Option<String>,
    events_route: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
