//! The four benchmarks, each preparing the bucket and running a [`Harness`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use futures::{StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use objperf_client::BoxedClient;

use crate::cleanup::remove_objects;
use crate::config::Config;
use crate::harness::Harness;
use crate::metrics::AggregateResult;
use crate::payload::Payload;
use crate::worker::{KeyTemplate, Operation};

/// Runs benchmarks against one bucket of a storage service.
#[derive(Debug)]
pub struct Bench {
    client: BoxedClient,
    bucket: String,
    prefix: String,
    setup_concurrency: usize,
}

impl Bench {
    /// Creates benchmarks for the bucket and key prefix in `config`.
    pub fn new(client: BoxedClient, config: &Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.object_prefix.clone(),
            setup_concurrency: config.setup_concurrency,
        }
    }

    async fn make_bucket(&self) -> Result<()> {
        self.client
            .make_bucket(&self.bucket)
            .await
            .with_context(|| format!("failed to create bucket `{}`", self.bucket))
    }

    async fn upload(&self, key: &str, size: u64, payload: &Payload) -> Result<()> {
        let reader = payload
            .reader(size)
            .await
            .with_context(|| format!("failed to open payload for `{key}`"))?;
        let uploaded = self
            .client
            .put_object(&self.bucket, key, size, reader)
            .await
            .with_context(|| format!("failed to upload `{key}`"))?;

        anyhow::ensure!(
            uploaded == size,
            "uploaded {} of {} for `{key}`",
            ByteSize::b(uploaded),
            ByteSize::b(size)
        );
        Ok(())
    }

    fn get(&self) -> Operation {
        Operation::get(Arc::clone(&self.client), &self.bucket)
    }

    fn put(&self, payload: &Payload) -> Operation {
        Operation::put(Arc::clone(&self.client), &self.bucket, payload.clone())
    }

    /// Repeatedly downloads one object from all workers for the given window.
    ///
    /// The object is uploaded first, so the service serves it from its cache.
    pub async fn get_cached(
        &self,
        size: u64,
        workers: usize,
        window: Duration,
        payload: &Payload,
    ) -> Result<AggregateResult> {
        self.make_bucket().await?;
        self.upload(&self.prefix, size, payload).await?;

        let key = KeyTemplate::Fixed(self.prefix.clone());
        let harness = Harness::new(self.get(), key, size, workers);
        with_spinner("Reading cached object", harness.run_for(window)).await
    }

    /// Uploads the objects read by [`get_uncached`](Self::get_uncached).
    pub async fn populate(&self, size: u64, count: usize, payload: &Payload) -> Result<()> {
        self.make_bucket().await?;

        let keys = KeyTemplate::PerWorker(self.prefix.clone());
        futures::stream::iter(0..count)
            .map(Ok)
            .try_for_each_concurrent(self.setup_concurrency.max(1), |index| {
                let key = keys.render(index, 0);
                async move { self.upload(&key, size, payload).await }
            })
            .await?;

        tracing::info!(count, size = %ByteSize::b(size), "uploaded objects");
        Ok(())
    }

    /// Downloads one distinct object per worker, all starting at the same instant.
    ///
    /// The objects must have been uploaded with [`populate`](Self::populate) or a previous
    /// [`put_cached`](Self::put_cached) run. Missing objects count as failures.
    pub async fn get_uncached(&self, size: u64, count: usize) -> Result<AggregateResult> {
        self.make_bucket().await?;

        let key = KeyTemplate::PerWorker(self.prefix.clone());
        let harness = Harness::new(self.get(), key, size, count);
        with_spinner("Reading objects", harness.run_once()).await
    }

    /// Uploads one object per worker, all starting at the same instant.
    ///
    /// Removes all objects from the bucket first.
    pub async fn put_cached(
        &self,
        size: u64,
        count: usize,
        payload: &Payload,
    ) -> Result<AggregateResult> {
        self.clear().await?;

        let key = KeyTemplate::PerWorker(self.prefix.clone());
        let harness = Harness::new(self.put(payload), key, size, count);
        with_spinner("Writing objects", harness.run_once()).await
    }

    /// Uploads fresh objects from all workers for the given window.
    ///
    /// Removes all objects from the bucket first.
    pub async fn put_uncached(
        &self,
        size: u64,
        workers: usize,
        window: Duration,
        payload: &Payload,
    ) -> Result<AggregateResult> {
        self.clear().await?;

        let key = KeyTemplate::PerIteration(self.prefix.clone());
        let harness = Harness::new(self.put(payload), key, size, workers);
        with_spinner("Writing objects", harness.run_for(window)).await
    }

    async fn clear(&self) -> Result<()> {
        self.make_bucket().await?;
        let removed =
            remove_objects(self.client.as_ref(), &self.bucket, self.setup_concurrency).await?;
        if removed > 0 {
            tracing::info!(removed, bucket = %self.bucket, "removed leftover objects");
        }
        Ok(())
    }
}

/// Shows a spinner on stderr while the measurement runs.
async fn with_spinner<T>(
    message: &'static str,
    measurement: impl Future<Output = T>,
) -> Result<T> {
    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    let output = measurement.await;
    bar.finish_and_clear();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use objperf_client::{InMemoryClient, StorageClient};

    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn bench(client: &InMemoryClient) -> Bench {
        Bench::new(Arc::new(client.clone()), &Config::default())
    }

    #[tokio::test(start_paused = true)]
    async fn get_cached_reads_uploaded_object() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(100));
        let bench = bench(&client);

        let result = bench
            .get_cached(MIB, 2, Duration::from_secs(10), &Payload::Random(0))
            .await
            .unwrap();

        assert_eq!(client.get_stored("testbucket", "testobject").unwrap().len() as u64, MIB);
        assert_eq!(result.failures, 0);
        assert!((result.bandwidth_mbps - 20.0).abs() <= 0.2, "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn get_uncached_after_populate() {
        let client = InMemoryClient::new().with_latency(Duration::from_secs(1));
        let bench = bench(&client);

        bench.populate(MIB, 4, &Payload::Random(0)).await.unwrap();
        assert_eq!(client.object_count("testbucket"), Some(4));

        let result = bench.get_uncached(MIB, 4).await.unwrap();
        assert_eq!(result.operations, 4);
        assert_eq!(result.failures, 0);
        assert!((result.bandwidth_mbps - 4.0).abs() < 0.01, "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn get_uncached_reads_configured_size() {
        let client = InMemoryClient::new().with_latency(Duration::from_secs(1));
        for i in 0..4 {
            client.insert("testbucket", &format!("testobject.{i}"), vec![0u8; 4 * MIB as usize]);
        }
        let bench = bench(&client);

        let result = bench.get_uncached(MIB, 4).await.unwrap();
        assert_eq!(result.operations, 4);
        assert_eq!(result.failures, 0);
        assert!((result.bandwidth_mbps - 4.0).abs() < 0.01, "{result:?}");
    }

    #[tokio::test]
    async fn populate_uploads_concurrently() {
        let client = InMemoryClient::new();
        let config = Config {
            setup_concurrency: 3,
            ..Config::default()
        };
        let bench = Bench::new(Arc::new(client.clone()), &config);

        bench.populate(1024, 10, &Payload::Random(0)).await.unwrap();
        assert_eq!(client.object_count("testbucket"), Some(10));
        assert_eq!(client.get_stored("testbucket", "testobject.9").unwrap().len(), 1024);
    }

    #[tokio::test(start_paused = true)]
    async fn get_uncached_without_objects() {
        let client = InMemoryClient::new();
        let bench = bench(&client);

        let result = bench.get_uncached(MIB, 3).await.unwrap();
        assert_eq!(result.operations, 0);
        assert_eq!(result.failures, 3);
        assert_eq!(result.bandwidth_mbps, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn put_cached_replaces_leftovers() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(500));
        client.insert("testbucket", "leftover", "data");
        let bench = bench(&client);

        let first = bench.put_cached(MIB, 3, &Payload::Random(0)).await.unwrap();
        assert_eq!(client.object_count("testbucket"), Some(3));
        assert!(client.get_stored("testbucket", "leftover").is_none());
        assert_eq!(client.get_stored("testbucket", "testobject.2").unwrap().len() as u64, MIB);

        let second = bench.put_cached(MIB, 3, &Payload::Random(0)).await.unwrap();
        assert_eq!(client.object_count("testbucket"), Some(3));
        assert_eq!(first.operations, second.operations);
        assert!((first.bandwidth_mbps - second.bandwidth_mbps).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn put_uncached_writes_fresh_keys() {
        let client = InMemoryClient::new().with_latency(Duration::from_millis(100));
        client.insert("testbucket", "leftover", "data");
        let bench = bench(&client);

        let result = bench
            .put_uncached(1024, 2, Duration::from_secs(1), &Payload::Random(0))
            .await
            .unwrap();

        assert!(client.get_stored("testbucket", "leftover").is_none());
        assert!(client.get_stored("testbucket", "testobject.1.0").is_some());
        assert!(client.object_count("testbucket").unwrap() as u64 >= result.operations);
        assert!((18..=20).contains(&result.operations), "{result:?}");
    }

    #[tokio::test]
    async fn upload_failure_aborts_setup() {
        let client = InMemoryClient::new();
        client.make_bucket("testbucket").await.unwrap();
        client.inject_failures(1);
        let bench = bench(&client);

        let error = bench
            .get_cached(1024, 1, Duration::from_secs(1), &Payload::Random(0))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("failed to upload"));
    }
}
