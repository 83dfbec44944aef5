use std::path::{Path, PathBuf};

use iroh::SecretKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

static DATA_DIR_NAME: &str = "feed_core";
static FEED_DB_NAME: &str = "feed_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// For now this directory structure should be like
// data_dir_path
// |- feed_core
//    |- feed_db.sqlite
//    |- config.json

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory on this platform")]
    NoDataDir,
    #[error("config io error")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Malformed(#[from] serde_json::Error),
}

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

fn default_fanout_concurrency() -> usize {
    8
}

fn default_max_page_size() -> u64 {
    50
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedConfig {
    /// Secret key for the local node/instance.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    /// Upper bound on concurrent per-follower notifications during a broadcast.
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,

    /// Largest page `list_notifications` will return.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// `tracing` filter directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl FeedConfig {
    /// Creates a new FeedConfig with a generated secret key and the specified data directory
    fn new(data_dir: &Path) -> Self {
        FeedConfig {
            secret_key: default_secret_key(),
            database_path: data_dir.join(FEED_DB_NAME),
            fanout_concurrency: default_fanout_concurrency(),
            max_page_size: default_max_page_size(),
            log_filter: default_log_filter(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

/// Gets the existing config or initializes a new one in the platform data directory
pub async fn get_or_init() -> Result<FeedConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    get_or_init_in(&data_dir.join(DATA_DIR_NAME)).await
}

/// Gets the existing config in `feed_dir` or writes a fresh one there
pub async fn get_or_init_in(feed_dir: &Path) -> Result<FeedConfig, ConfigError> {
    let config_path = feed_dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(feed_dir).await?;

    if config_path.exists() {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: FeedConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        let config = FeedConfig::new(feed_dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        Ok(config)
    }
}
