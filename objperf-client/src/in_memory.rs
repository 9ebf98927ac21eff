//! In-memory client for tests.
//!
//! This provides a [`StorageClient`] backed by a `HashMap`, removing the need for a running
//! object store in unit tests. Every upload and download can be delayed by a fixed latency, and
//! failures can be injected to exercise error accounting. The client is [`Clone`] so tests can
//! hold a handle for direct inspection while the harness owns a shared copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncReadExt;

use crate::common::{ClientError, ClientResult, ObjectKeys, PayloadReader, StorageClient};

type Store = HashMap<String, BTreeMap<String, Bytes>>;

/// A [`StorageClient`] that keeps all objects in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    store: Arc<Mutex<Store>>,
    latency: Duration,
    failures: Arc<AtomicUsize>,
}

impl InMemoryClient {
    /// Creates an empty client without latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every upload and download by the given latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next `count` uploads or downloads fail after their latency has passed.
    pub fn inject_failures(&self, count: usize) {
        self.failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Returns a copy of the stored object, if present.
    pub fn get_stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let store = self.store.lock().unwrap();
        store.get(bucket)?.get(key).cloned()
    }

    /// Returns the number of objects in the bucket, or `None` if the bucket does not exist.
    pub fn object_count(&self, bucket: &str) -> Option<usize> {
        self.store.lock().unwrap().get(bucket).map(BTreeMap::len)
    }

    /// Stores an object directly, bypassing latency and failure injection.
    pub fn insert(&self, bucket: &str, key: &str, contents: impl Into<Bytes>) {
        self.store
            .lock()
            .unwrap()
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), contents.into());
    }

    async fn simulate_transfer(&self) -> ClientResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(ClientError::Generic("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl StorageClient for InMemoryClient {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn make_bucket(&self, bucket: &str) -> ClientResult<()> {
        self.store
            .lock()
            .unwrap()
            .entry(bucket.to_owned())
            .or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        payload: PayloadReader,
    ) -> ClientResult<u64> {
        let mut contents = Vec::with_capacity(size as usize);
        payload.take(size).read_to_end(&mut contents).await?;
        self.simulate_transfer().await?;

        let mut store = self.store.lock().unwrap();
        let objects = store
            .get_mut(bucket)
            .ok_or_else(|| ClientError::NotFound(format!("bucket `{bucket}`")))?;

        let uploaded = contents.len() as u64;
        objects.insert(key.to_owned(), Bytes::from(contents));
        Ok(uploaded)
    }

    async fn get_object(&self, bucket: &str, key: &str, size: u64) -> ClientResult<u64> {
        self.simulate_transfer().await?;

        self.get_stored(bucket, key)
            .map(|bytes| (bytes.len() as u64).min(size))
            .ok_or_else(|| ClientError::NotFound(format!("object `{bucket}/{key}`")))
    }

    async fn list_objects(&self, bucket: &str) -> ClientResult<ObjectKeys> {
        let keys: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .get(bucket)
            .ok_or_else(|| ClientError::NotFound(format!("bucket `{bucket}`")))?
            .keys()
            .cloned()
            .collect();

        Ok(futures_util::stream::iter(keys.into_iter().map(Ok)).boxed())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> ClientResult<()> {
        if let Some(objects) = self.store.lock().unwrap().get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}
