//! 🔌 Stores: where the real I/O happens.
//!
//! 🪣 A store lists objects, runs filtered reads against them, and deletes the
//! unlucky ones. That is the entire contract. Everything else in this crate is
//! arithmetic and plumbing on top of these three calls.
//!
//! 🎭 This module is the casting agency. Need the real S3? Got it. Need a
//! bucket that lives in RAM and never sends you a bill? Also got it.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use tracing::info;

use crate::common::{FilterQuery, ObjectDescriptor};

pub mod in_mem;
pub mod s3;

pub use in_mem::{InMemoryObjectConfig, InMemoryStore, InMemoryStoreConfig};
pub use s3::{S3Store, S3StoreConfig};

/// 📡 One event of a filtered-read response stream.
///
/// Only `Records` carries data. The rest is the store making small talk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectEvent {
    /// 📦 A chunk of output bytes. May end mid-record. Usually does, out of spite.
    Records(Vec<u8>),
    /// 📊 Byte accounting for the whole request.
    Stats {
        bytes_scanned: i64,
        bytes_processed: i64,
        bytes_returned: i64,
    },
    /// 🔄 Periodic progress ping.
    Progress,
    /// 💓 Keep-alive so the connection doesn't nod off.
    Continuation,
    /// 🏁 The store is done talking.
    End,
}

/// 🚰 The filtered-read response: a pinned, boxed, Send-able stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SelectEvent>> + Send>>;

/// 📄 One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,
    /// 🔗 Where the next page starts. `None` means this was the last one.
    pub next_token: Option<String>,
}

/// 🪣 The object-store boundary.
///
/// # Contract
/// - `list_page` returns one page of keys starting with `prefix`, in key order,
///   plus a continuation token while more pages remain.
/// - `select` starts a filtered read and hands back the raw event stream. The
///   caller drains it.
/// - `delete` removes one object. Deleting something that isn't there is the
///   store's business, not ours.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ListPage>;

    async fn select(&self, query: &FilterQuery) -> Result<EventStream>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// 🎭 The many faces of a Store. Enum dispatch, so the engine never has to know
/// whether it's talking to AWS or to a `BTreeMap` wearing a bucket costume.
#[derive(Debug)]
pub enum StoreBackend {
    S3(S3Store),
    InMemory(InMemoryStore),
}

/// 🔧 Which store to build, straight from config.
#[derive(Debug, serde::Deserialize, Clone)]
pub enum StoreConfig {
    // -- 🔡 env vars arrive lowercased, hence the aliases
    #[serde(alias = "s3")]
    S3(S3StoreConfig),
    #[serde(alias = "inmemory", alias = "in_memory")]
    InMemory(InMemoryStoreConfig),
}

impl StoreBackend {
    /// 🚀 Build the configured store. The S3 arm loads AWS config, which can take a
    /// moment while the credential chain goes looking for itself.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::S3(s3_config) => {
                let the_store = S3Store::new(s3_config).await?;
                info!("🪣 S3 store ready in {}", the_store.region());
                Ok(Self::S3(the_store))
            }
            StoreConfig::InMemory(in_mem_config) => {
                Ok(Self::InMemory(InMemoryStore::from_config(in_mem_config)?))
            }
        }
    }
}

#[async_trait]
impl Store for StoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ListPage> {
        match self {
            StoreBackend::S3(store) => {
                store
                    .list_page(bucket, prefix, continuation_token, max_keys)
                    .await
            }
            StoreBackend::InMemory(store) => {
                store
                    .list_page(bucket, prefix, continuation_token, max_keys)
                    .await
            }
        }
    }

    async fn select(&self, query: &FilterQuery) -> Result<EventStream> {
        match self {
            StoreBackend::S3(store) => store.select(query).await,
            StoreBackend::InMemory(store) => store.select(query).await,
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        match self {
            StoreBackend::S3(store) => store.delete(bucket, key).await,
            StoreBackend::InMemory(store) => store.delete(bucket, key).await,
        }
    }
}
