//! Application-level configuration loading: storage backend, topic selection,
//! winner policy and client poll intervals.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WIKI_RACE_BACK_CONFIG_PATH";

const DEFAULT_MAX_DRAWS: u32 = 10;
const DEFAULT_JOIN_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_ROSTER_INTERVAL_MS: u64 = 2_000;
const DEFAULT_TRANSITION_INTERVAL_MS: u64 = 250;
const DEFAULT_RACE_INTERVAL_MS: u64 = 5_000;

/// Which session store the binary installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local maps.
    #[default]
    Memory,
    /// MongoDB, configured through `MONGO_URI` / `MONGO_DB`.
    Mongo,
}

/// How the start/target pair is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicMode {
    /// Draw two distinct topics from a catalog.
    #[default]
    Random,
    /// Always use `fixed_start` / `fixed_target`.
    Fixed,
}

/// Source of popular topics for random selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// The `static_topics` list.
    #[default]
    Static,
    /// Wikimedia top page views of the previous month.
    Wikimedia,
}

/// Which of two racing target arrivals is recorded as the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerPolicy {
    /// Plain overwrite: the last physical commit is the winner.
    #[default]
    LastWriteWins,
    /// Conditional commit guarded on an unset winner.
    FirstCommitWins,
}

/// Topic selection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicsConfig {
    /// Random or fixed selection.
    pub mode: TopicMode,
    /// Start topic used in fixed mode.
    pub fixed_start: Option<String>,
    /// Target topic used in fixed mode.
    pub fixed_target: Option<String>,
    /// Catalog backing random mode.
    pub catalog: CatalogKind,
    /// Topics served by the static catalog.
    pub static_topics: Vec<String>,
    /// Upper bound on target redraws before giving up.
    pub max_draws: u32,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            mode: TopicMode::default(),
            fixed_start: None,
            fixed_target: None,
            catalog: CatalogKind::default(),
            static_topics: default_static_topics(),
            max_draws: DEFAULT_MAX_DRAWS,
        }
    }
}

/// Poll intervals used by the client synchronization loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Lobby roster refresh.
    pub roster_interval: Duration,
    /// Lobby to race transition watch.
    pub transition_interval: Duration,
    /// Race to end watch.
    pub race_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            roster_interval: Duration::from_millis(DEFAULT_ROSTER_INTERVAL_MS),
            transition_interval: Duration::from_millis(DEFAULT_TRANSITION_INTERVAL_MS),
            race_interval: Duration::from_millis(DEFAULT_RACE_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Session store backend.
    pub storage: StorageBackend,
    /// Topic selection.
    pub topics: TopicsConfig,
    /// Winner commit policy.
    pub winner_policy: WinnerPolicy,
    /// Client poll intervals.
    pub sync: SyncConfig,
    /// How many random join codes to try before giving up.
    pub join_code_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            topics: TopicsConfig::default(),
            winner_policy: WinnerPolicy::default(),
            sync: SyncConfig::default(),
            join_code_attempts: DEFAULT_JOIN_CODE_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        storage = ?app_config.storage,
                        topic_mode = ?app_config.topics.mode,
                        winner_policy = ?app_config.winner_policy,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent keys take their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    storage: StorageBackend,
    topics: RawTopics,
    winner_policy: WinnerPolicy,
    sync: RawSync,
    join_code_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTopics {
    mode: TopicMode,
    fixed_start: Option<String>,
    fixed_target: Option<String>,
    catalog: CatalogKind,
    static_topics: Option<Vec<String>>,
    max_draws: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSync {
    roster_interval_ms: Option<u64>,
    transition_interval_ms: Option<u64>,
    race_interval_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            storage: value.storage,
            topics: value.topics.into(),
            winner_policy: value.winner_policy,
            sync: value.sync.into(),
            join_code_attempts: value
                .join_code_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(DEFAULT_JOIN_CODE_ATTEMPTS),
        }
    }
}

impl From<RawTopics> for TopicsConfig {
    fn from(value: RawTopics) -> Self {
        let static_topics = value
            .static_topics
            .map(|topics| {
                topics
                    .into_iter()
                    .map(|topic| topic.trim().to_owned())
                    .filter(|topic| !topic.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|topics| !topics.is_empty())
            .unwrap_or_else(default_static_topics);
        Self {
            mode: value.mode,
            fixed_start: value.fixed_start,
            fixed_target: value.fixed_target,
            catalog: value.catalog,
            static_topics,
            max_draws: value
                .max_draws
                .filter(|draws| *draws > 0)
                .unwrap_or(DEFAULT_MAX_DRAWS),
        }
    }
}

impl From<RawSync> for SyncConfig {
    fn from(value: RawSync) -> Self {
        let millis = |raw: Option<u64>, default: u64| {
            Duration::from_millis(raw.filter(|ms| *ms > 0).unwrap_or(default))
        };
        Self {
            roster_interval: millis(value.roster_interval_ms, DEFAULT_ROSTER_INTERVAL_MS),
            transition_interval: millis(
                value.transition_interval_ms,
                DEFAULT_TRANSITION_INTERVAL_MS,
            ),
            race_interval: millis(value.race_interval_ms, DEFAULT_RACE_INTERVAL_MS),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in topic list shipped with the binary.
fn default_static_topics() -> Vec<String> {
    [
        "Albert_Einstein",
        "Ancient_Rome",
        "Black_hole",
        "Chess",
        "Coffee",
        "DNA",
        "Eiffel_Tower",
        "Football",
        "Internet",
        "Jazz",
        "Leonardo_da_Vinci",
        "Moon",
        "Mount_Everest",
        "Octopus",
        "Photosynthesis",
        "Pizza",
        "Roman_Empire",
        "Solar_System",
        "Tiger",
        "Volcano",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sync.transition_interval, Duration::from_millis(250));
        assert_eq!(config.sync.roster_interval, Duration::from_secs(2));
        assert_eq!(config.sync.race_interval, Duration::from_secs(5));
        assert_eq!(config.winner_policy, WinnerPolicy::LastWriteWins);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "storage": "mongo",
                "winner_policy": "first_commit_wins",
                "topics": {
                    "mode": "fixed",
                    "fixed_start": "Dog",
                    "fixed_target": "Cat",
                    "static_topics": ["A", "  ", "B"],
                    "max_draws": 3
                },
                "sync": { "race_interval_ms": 1000 },
                "join_code_attempts": 2
            }"#,
        )
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Mongo);
        assert_eq!(config.winner_policy, WinnerPolicy::FirstCommitWins);
        assert_eq!(config.topics.mode, TopicMode::Fixed);
        assert_eq!(config.topics.fixed_start.as_deref(), Some("Dog"));
        assert_eq!(config.topics.static_topics, vec!["A", "B"]);
        assert_eq!(config.topics.max_draws, 3);
        assert_eq!(config.sync.race_interval, Duration::from_secs(1));
        assert_eq!(config.sync.roster_interval, Duration::from_secs(2));
        assert_eq!(config.join_code_attempts, 2);
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = AppConfig::from_json(
            r#"{"join_code_attempts": 0, "topics": {"max_draws": 0, "static_topics": []},
                "sync": {"transition_interval_ms": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.join_code_attempts, DEFAULT_JOIN_CODE_ATTEMPTS);
        assert_eq!(config.topics.max_draws, DEFAULT_MAX_DRAWS);
        assert_eq!(config.topics.static_topics, default_static_topics());
        assert_eq!(config.sync.transition_interval, Duration::from_millis(250));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        assert!(AppConfig::from_json(r#"{"storage": "couch"}"#).is_err());
    }
}
