//! Removal of leftover objects between write benchmarks.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use futures::TryStreamExt;
use objperf_client::StorageClient;

/// Removes every object in `bucket`, issuing up to `concurrency` removals at once.
///
/// Returns the number of removed objects. Stops at the first listing or removal error.
pub async fn remove_objects(
    client: &dyn StorageClient,
    bucket: &str,
    concurrency: usize,
) -> Result<usize> {
    let removed = AtomicUsize::new(0);

    client
        .list_objects(bucket)
        .await
        .with_context(|| format!("failed to list objects in `{bucket}`"))?
        .try_for_each_concurrent(concurrency.max(1), |key| {
            let removed = &removed;
            async move {
                client.remove_object(bucket, &key).await?;
                tracing::trace!(%key, "removed object");
                removed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        })
        .await
        .with_context(|| format!("failed to remove objects from `{bucket}`"))?;

    let removed = removed.into_inner();
    tracing::debug!(bucket, removed, "cleared bucket");
    Ok(removed)
}
