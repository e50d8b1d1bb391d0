// ai
//! 📜 Listing: turning "bucket + prefix" into every key, no matter how many pages it takes.
//!
//! The store hands out keys a page at a time, like a deli counter that only
//! slices a thousand at once. We keep taking a number until the token runs
//! out, stitch the pages together in order, and hand back one list. Callers
//! never see a page boundary.
//!
//! 🧠 Knowledge graph:
//! - One strategy: multi-page ListObjectsV2 with continuation tokens
//! - The whole walk runs under `listing_timeout` (30s by default, configurable)
//! - Failure means failure: no partial lists. The engine decides what an
//!   empty scan means.
//! - A token that comes back twice is a store bug; we bail instead of spinning forever

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::common::ObjectDescriptor;
use crate::stores::Store;

/// 🔧 Knobs for one listing walk.
#[derive(Debug, Clone, Copy)]
pub struct ListingOptions {
    pub timeout: Duration,
    pub max_keys: Option<i32>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_keys: None,
        }
    }
}

/// 📜 List every object under `prefix`, page after page, in store order.
///
/// Returns `Err` on any page failure or on timeout. Never returns a partial list.
pub async fn list_objects<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
    options: ListingOptions,
) -> Result<Vec<ObjectDescriptor>>
where
    S: Store + ?Sized,
{
    tokio::time::timeout(options.timeout, walk_pages(store, bucket, prefix, options.max_keys))
        .await
        .with_context(|| {
            format!(
                "💀 listing s3://{bucket}/{prefix} took longer than {:?}. We stopped waiting.",
                options.timeout
            )
        })?
}

async fn walk_pages<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
    max_keys: Option<i32>,
) -> Result<Vec<ObjectDescriptor>>
where
    S: Store + ?Sized,
{
    let mut the_objects = Vec::new();
    let mut the_tokens_seen = HashSet::new();
    let mut the_token: Option<String> = None;
    let mut the_page_number = 0usize;

    loop {
        the_page_number += 1;
        let the_page = store
            .list_page(bucket, prefix, the_token.clone(), max_keys)
            .await
            .with_context(|| format!("💀 listing page {the_page_number} of s3://{bucket}/{prefix} failed"))?;

        debug!(
            "📄 page {} of s3://{}/{}: {} keys",
            the_page_number,
            bucket,
            prefix,
            the_page.objects.len()
        );
        the_objects.extend(the_page.objects);

        match the_page.next_token {
            Some(next) => {
                if !the_tokens_seen.insert(next.clone()) {
                    bail!(
                        "💀 continuation token '{next}' came back twice while listing s3://{bucket}/{prefix}. \
                         The store is going in circles and we refuse to join it."
                    );
                }
                the_token = Some(next);
            }
            None => break,
        }
    }

    Ok(the_objects)
}
