// ai
//! 🪣📡🏗️ S3 Store: the real bucket, the real network, the real bill.
//!
//! INT. AWS CONSOLE, NIGHT. A bucket full of gzipped JSON Lines. Nobody wants
//! to download it. Nobody has to. S3 Select reads the objects server-side and
//! sends back only the rows that match, as an event stream of byte chunks.
//!
//! 🧠 Knowledge graph:
//! - `S3StoreConfig`: region, optional endpoint (LocalStack, MinIO), optional static keys
//! - Listing: `ListObjectsV2` with continuation tokens, one page per call
//! - Filtered read: `SelectObjectContent` → `EventReceiver` → [`EventStream`]
//! - Delete: `DeleteObject`, fire and report
//! - SDK errors are flattened with `DisplayErrorContext` so the whole cause chain
//!   survives the trip into `anyhow`
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{
    CompressionType, ExpressionType, InputSerialization, JsonInput, JsonOutput, JsonType,
    OutputSerialization, SelectObjectContentEventStream,
};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::common::{self, FilterQuery, ObjectDescriptor};
use crate::stores::{EventStream, ListPage, SelectEvent, Store};

// ============================================================
//  🔧 S3StoreConfig: knobs, dials, and optionally some keys
// ============================================================

/// 🔧 Configuration for the S3 store.
///
/// Credentials: when both `access_key_id` and `secret_access_key` are set we use
/// them as static credentials (plus `session_token` if present). Otherwise the
/// default AWS provider chain does its thing: env vars, profile, IMDS, hope.
#[derive(Debug, Deserialize, Clone)]
pub struct S3StoreConfig {
    /// 🌎 AWS region. Defaults to us-east-1, where data goes to retire.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🧪 Custom endpoint for S3-compatible stores. `None` means real AWS.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 🛣️ `http://host/bucket/key` instead of `http://bucket.host/key`. Most
    /// S3-compatible stores want this on.
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

fn default_s3_region() -> String {
    // -- 🏖️ If you don't choose a region, the region chooses you. And it chose Virginia.
    "us-east-1".to_string()
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

impl S3StoreConfig {
    /// 🔒 Static credentials, if the config carries a full key pair.
    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials::new(
                access_key_id,
                secret_access_key,
                self.session_token.clone(),
                None,
                "s3sift-static",
            )),
            _ => None,
        }
    }
}

// ============================================================
//  🪣 S3Store: the client wrapper
// ============================================================

/// 🪣 S3Store: a cloneable `aws_sdk_s3::Client` plus the label we log it under.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3Store {
    /// 🚀 Load AWS config, apply overrides, build the client.
    ///
    /// No request is made here. A wrong bucket or a missing permission shows up on
    /// the first listing call, which logs it and degrades to an empty scan.
    pub async fn new(config: &S3StoreConfig) -> Result<Self> {
        let mut the_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(the_credentials) = config.static_credentials() {
            debug!("🔒 using static credentials from config");
            the_loader = the_loader.credentials_provider(the_credentials);
        }
        if let Some(the_endpoint) = &config.endpoint_url {
            debug!("🧪 custom S3 endpoint: {}", the_endpoint);
            the_loader = the_loader.endpoint_url(the_endpoint);
        }

        let the_sdk_config = the_loader.load().await;
        let the_s3_config = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(the_s3_config),
            region: config.region.clone(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// 🗜️ Map the fixed serialization parameters onto the SDK's builder zoo.
fn select_serialization(query: &FilterQuery) -> (InputSerialization, OutputSerialization) {
    let the_input = query.input_serialization();
    let the_compression = match the_input.compression {
        common::Compression::Gzip => CompressionType::Gzip,
    };
    let the_json_type = match the_input.json_type {
        common::JsonType::Lines => JsonType::Lines,
    };

    let input = InputSerialization::builder()
        .compression_type(the_compression)
        .json(JsonInput::builder().r#type(the_json_type).build())
        .build();
    let output = OutputSerialization::builder()
        .json(
            JsonOutput::builder()
                .record_delimiter(query.output_serialization().record_delimiter)
                .build(),
        )
        .build();
    (input, output)
}

/// 📡 SDK event → our event. Unknown variants are treated as keep-alives.
fn translate_event(event: SelectObjectContentEventStream) -> SelectEvent {
    match event {
        SelectObjectContentEventStream::Records(records) => SelectEvent::Records(
            records
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        ),
        SelectObjectContentEventStream::Stats(stats) => {
            let the_details = stats.details();
            SelectEvent::Stats {
                bytes_scanned: the_details.and_then(|d| d.bytes_scanned()).unwrap_or(0),
                bytes_processed: the_details.and_then(|d| d.bytes_processed()).unwrap_or(0),
                bytes_returned: the_details.and_then(|d| d.bytes_returned()).unwrap_or(0),
            }
        }
        SelectObjectContentEventStream::Progress(_) => SelectEvent::Progress,
        SelectObjectContentEventStream::Cont(_) => SelectEvent::Continuation,
        SelectObjectContentEventStream::End(_) => SelectEvent::End,
        _ => SelectEvent::Continuation,
    }
}

#[async_trait]
impl Store for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ListPage> {
        let the_response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .set_max_keys(max_keys)
            .send()
            .await
            .map_err(|err| anyhow!("{}", DisplayErrorContext(&err)))
            .with_context(|| {
                format!(
                    "💀 ListObjectsV2 failed for s3://{bucket}/{prefix}. \
                     Check: bucket name, region, credentials, and whether the bucket still exists."
                )
            })?;

        let objects: Vec<ObjectDescriptor> = the_response
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| {
                    ObjectDescriptor::new(bucket, key, object.size().unwrap_or(0).max(0) as u64)
                })
            })
            .collect();

        // -- 🔗 truncated means a token must follow. No token is a broken listing, not the last page.
        let next_token = match the_response.is_truncated() {
            Some(true) => Some(
                the_response
                    .next_continuation_token()
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        anyhow!(
                            "💀 ListObjectsV2 for s3://{bucket}/{prefix} says the listing is \
                             truncated but sent no continuation token"
                        )
                    })?,
            ),
            _ => None,
        };

        trace!(
            "🪣 listed {} keys under s3://{}/{} (more pages: {})",
            objects.len(),
            bucket,
            prefix,
            next_token.is_some()
        );
        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn select(&self, query: &FilterQuery) -> Result<EventStream> {
        let (the_input, the_output) = select_serialization(query);

        let the_response = self
            .client
            .select_object_content()
            .bucket(&query.bucket)
            .key(&query.key)
            .expression(&query.expression)
            .expression_type(ExpressionType::Sql)
            .input_serialization(the_input)
            .output_serialization(the_output)
            .send()
            .await
            .map_err(|err| anyhow!("{}", DisplayErrorContext(&err)))
            .with_context(|| {
                format!(
                    "💀 SelectObjectContent rejected for s3://{}/{}",
                    query.bucket, query.key
                )
            })?;

        // 🔄 EventReceiver → Stream. After the first error we stop polling: a broken
        // event stream does not heal itself.
        let events = futures::stream::unfold(Some(the_response.payload), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(Some(event)) => Some((Ok(translate_event(event)), Some(receiver))),
                Ok(None) => None,
                Err(err) => Some((
                    Err(anyhow!(
                        "💀 select event stream broke: {}",
                        DisplayErrorContext(&err)
                    )),
                    None,
                )),
            }
        });

        Ok(Box::pin(events))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| anyhow!("{}", DisplayErrorContext(&err)))
            .with_context(|| format!("💀 DeleteObject failed for s3://{bucket}/{key}"))?;
        Ok(())
    }
}

// ============================================================
//  🧪 Tests: a fake S3 on localhost, courtesy of wiremock
// ============================================================
