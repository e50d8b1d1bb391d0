//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Three sections: `[store]` says where the objects live, `[scan]` says which
//! ones and what to ask them, `[runtime]` says how hard to push.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::listing::ListingOptions;
use crate::stores::StoreConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🪣 Real S3 or the pretend kind.
    pub store: StoreConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎯 What to scan. Bucket and query are optional here because CLI flags may
/// supply them; [`ScanConfig::resolve`] insists they exist by the end.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScanConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default, alias = "expression")]
    pub query: Option<String>,
}

/// 🎯 A scan target with nothing left to guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub bucket: String,
    pub prefix: String,
    pub expression: String,
}

impl ScanConfig {
    pub fn resolve(&self) -> Result<ScanTarget> {
        let bucket = self
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| anyhow!("💀 no bucket configured. Set [scan].bucket or pass --bucket."))?;
        let expression = self
            .query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| anyhow!("💀 no query configured. Set [scan].query or pass --query."))?;
        Ok(ScanTarget {
            bucket,
            prefix: self.prefix.clone(),
            expression,
        })
    }
}

/// 🏎️ How hard to push the store.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 🧵 Filtered reads in flight at once during count and delete.
    #[serde(default = "default_max_in_flight", alias = "workers")]
    pub max_in_flight: usize,
    /// 📬 Objects queued ahead of the workers.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 🚰 Bytes buffered between the event pump and the decoder, per read.
    #[serde(default = "default_pipe_capacity_bytes")]
    pub pipe_capacity_bytes: usize,
    #[serde(default = "default_listing_timeout_secs")]
    pub listing_timeout_secs: u64,
    /// ⏱️ Per-object cap on a filtered read. Unset means no cap.
    #[serde(default)]
    pub select_timeout_secs: Option<u64>,
    /// 📄 Page size hint for listing. Unset lets the store pick (S3 says 1000).
    #[serde(default)]
    pub max_keys: Option<i32>,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_max_in_flight() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    64
}

fn default_pipe_capacity_bytes() -> usize {
    64 * 1024
}

fn default_listing_timeout_secs() -> u64 {
    30
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            queue_capacity: default_queue_capacity(),
            pipe_capacity_bytes: default_pipe_capacity_bytes(),
            listing_timeout_secs: default_listing_timeout_secs(),
            select_timeout_secs: None,
            max_keys: None,
            show_progress: default_show_progress(),
        }
    }
}

impl RuntimeConfig {
    pub fn listing_options(&self) -> ListingOptions {
        ListingOptions {
            timeout: Duration::from_secs(self.listing_timeout_secs),
            max_keys: self.max_keys,
        }
    }

    pub fn select_timeout(&self) -> Option<Duration> {
        self.select_timeout_secs.map(Duration::from_secs)
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`S3SIFT_*`, nested keys split on `__`) with
/// an optional TOML file. The file wins on conflicts.
///
/// 💀 Returns an error if config is unparseable. The message says which layer to blame.
pub fn load_config(config_file_name: Option<&Path>) -> Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("S3SIFT_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (S3SIFT_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (S3SIFT_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
