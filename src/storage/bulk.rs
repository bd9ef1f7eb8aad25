//! Bulk listing, copy and delete shared by both backends.
//!
//! Deletion runs as a three-stage pipeline:
//!
//! ```text
//!   listing ──► producer ──keys──►  deleter   (batches, bounded concurrency)
//!                   │
//!                   └────sizes──►  accountant (sums bytes)
//! ```
//!
//! Both hand-offs are bounded channels, so a slow delete stage holds the
//! listing back. When the deleter fails it closes the key channel, which
//! stops the producer at its next send.

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use super::paths;
use super::traits::ObjectClient;
use super::types::ListedObject;
use crate::error::{Result, StorageError, with_timeout};

const CHANNEL_CAPACITY: usize = 256;
const DELETE_BATCH_SIZE: usize = 100;
const DELETE_CONCURRENCY: usize = 8;
const COPY_CONCURRENCY: usize = 8;

/// Every object (not sub-prefix) under `prefix`.
pub(crate) fn list_files(
    client: &dyn ObjectClient,
    prefix: &str,
    recursive: bool,
) -> BoxStream<'static, Result<ListedObject>> {
    client
        .list_objects(prefix, recursive)
        .try_filter(|entry| futures::future::ready(!entry.is_prefix))
        .boxed()
}

/// Collect a listing under the object timeout.
pub(crate) async fn collect_listing(
    client: &dyn ObjectClient,
    prefix: &str,
    recursive: bool,
    timeout: Duration,
) -> Result<Vec<ListedObject>> {
    with_timeout(
        "list objects",
        timeout,
        client.list_objects(prefix, recursive).try_collect(),
    )
    .await
}

/// Delete every object yielded by `objects`, returning their summed size.
///
/// Keys yielded more than once are deleted and counted once.
pub(crate) async fn delete_all<S>(
    client: &dyn ObjectClient,
    objects: S,
    timeout: Duration,
) -> Result<u64>
where
    S: Stream<Item = Result<ListedObject>> + Send,
{
    let (key_tx, key_rx) = async_channel::bounded::<String>(CHANNEL_CAPACITY);
    let (size_tx, size_rx) = async_channel::bounded::<u64>(CHANNEL_CAPACITY);

    let producer = async {
        let result = produce(objects, &key_tx, &size_tx, timeout).await;
        key_tx.close();
        size_tx.close();
        result
    };

    let deleter = async {
        let result = delete_keys(client, key_rx.clone(), timeout).await;
        key_rx.close();
        result
    };

    let accountant = async {
        let mut total = 0u64;
        while let Ok(size) = size_rx.recv().await {
            total += size;
        }
        total
    };

    let (produced, deleted, total) = futures::join!(producer, deleter, accountant);
    deleted?;
    produced?;
    Ok(total)
}

async fn produce<S>(
    objects: S,
    key_tx: &async_channel::Sender<String>,
    size_tx: &async_channel::Sender<u64>,
    timeout: Duration,
) -> Result<()>
where
    S: Stream<Item = Result<ListedObject>> + Send,
{
    let mut objects = std::pin::pin!(objects);
    let mut seen = HashSet::new();

    // Every step of the listing runs under the object deadline.
    while let Some(entry) = with_timeout("list objects", timeout, async {
        Ok::<_, StorageError>(objects.next().await)
    })
    .await?
    {
        let entry = entry?;
        if entry.is_prefix || !seen.insert(entry.key.clone()) {
            continue;
        }
        if key_tx.send(entry.key).await.is_err() {
            debug!("delete stage stopped, ending listing");
            return Ok(());
        }
        if size_tx.send(entry.size).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

async fn delete_keys(
    client: &dyn ObjectClient,
    keys: async_channel::Receiver<String>,
    timeout: Duration,
) -> Result<()> {
    let mut batches = std::pin::pin!(keys.ready_chunks(DELETE_BATCH_SIZE));

    while let Some(batch) = batches.next().await {
        debug!(count = batch.len(), "deleting batch");
        stream::iter(batch.into_iter().map(Ok::<_, StorageError>))
            .try_for_each_concurrent(DELETE_CONCURRENCY, |key: String| async move {
                with_timeout("delete object", timeout, client.delete_object(&key))
                    .await
                    .inspect_err(|e| warn!(key = %key, error = %e, "failed to delete object"))
            })
            .await?;
    }
    Ok(())
}

/// Copy every object under `src` to its `src` -> `dst` rewritten key.
///
/// The listing is taken in full before the first copy, so copies that land
/// under `src` are never listed and copied again. Returns the source objects
/// that were copied. Objects whose key would not change are skipped.
pub(crate) async fn copy_prefix(
    client: &dyn ObjectClient,
    src: &str,
    dst: &str,
    recursive: bool,
    timeout: Duration,
) -> Result<Vec<ListedObject>> {
    let planned: Vec<(ListedObject, String)> = collect_listing(client, src, recursive, timeout)
        .await?
        .into_iter()
        .filter(|entry| !entry.is_prefix)
        .filter_map(|entry| {
            let target = paths::rewrite_prefix(&entry.key, src, dst);
            (target != entry.key).then_some((entry, target))
        })
        .collect();

    stream::iter(planned)
        .map(|(entry, target)| async move {
            debug!(from = %entry.key, to = %target, "copying object");
            with_timeout(
                "copy object",
                timeout,
                client.copy_object(&entry.key, &target),
            )
            .await
            .map(|()| entry)
        })
        .buffer_unordered(COPY_CONCURRENCY)
        .try_collect()
        .await
}
