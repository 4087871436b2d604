use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::AccessGate;
use crate::error::Result;
use crate::resource::ResourceKind;
use crate::services::{ObjectInfo, ObjectStoreService};

/// Object storage restricted to the plugin's buckets. There is no default
/// bucket; every call names one.
#[derive(Clone)]
pub struct ObjectStoreProxy {
    gate: AccessGate,
    service: Arc<dyn ObjectStoreService>,
}

impl ObjectStoreProxy {
    pub(crate) fn new(gate: AccessGate, service: Arc<dyn ObjectStoreService>) -> Self {
        Self { gate, service }
    }

    fn bucket(&self, bucket: &str) -> Result<String> {
        self.gate.check(ResourceKind::Bucket, bucket)
    }

    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let bucket = self.bucket(bucket)?;
        self.service
            .upload(&bucket, key, data.into(), content_type)
            .await
    }

    pub async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let bucket = self.bucket(bucket)?;
        self.service.download(&bucket, key).await
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let bucket = self.bucket(bucket)?;
        self.service.delete(&bucket, key).await
    }

    pub async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let bucket = self.bucket(bucket)?;
        self.service.list(&bucket, prefix).await
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let bucket = self.bucket(bucket)?;
        self.service.exists(&bucket, key).await
    }

    pub async fn presign(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let bucket = self.bucket(bucket)?;
        self.service.presign(&bucket, key, expires_in).await
    }

    pub fn get_allowed_buckets(&self) -> Result<Vec<String>> {
        self.gate.allowed(ResourceKind::Bucket)
    }
}

impl std::fmt::Debug for ObjectStoreProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreProxy")
            .field("plugin", &self.gate.plugin())
            .finish_non_exhaustive()
    }
}
