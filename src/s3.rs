use crate::config::Config;
use crate::error::ObjectStorageError;
use crate::store::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;

pub struct ObjectStorage {
    client: Client,
    bucket: String,
    region: String,
}

impl ObjectStorage {
    pub async fn new(cfg: &Config) -> Result<Self, ObjectStorageError> {
        let region = cfg.storage.aws_region.clone();
        let credentials = Credentials::new(
            &cfg.storage.aws_access_key_id,
            &cfg.storage.aws_secret_access_key,
            None,
            None,
            "config",
        );

        let mut loader = aws_config::from_env()
            .region(aws_config::Region::new(region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint_url) = cfg.storage.aws_endpoint_url_s3.as_deref().filter(|u| !u.is_empty()) {
            loader = loader.endpoint_url(endpoint_url);
        }
        let config = loader.load().await;

        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket: cfg.app.get_bucket().to_string(),
            region,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ObjectStore for ObjectStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), ObjectStorageError> {
        tracing::info!(key, bytes = data.len(), "putting object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ObjectStorageError::S3Error(Box::new(e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStorageError> {
        // DeleteObject succeeds on missing keys, so check first to report them.
        if !self.exists(key).await? {
            return Err(ObjectStorageError::NotFound(key.to_string()));
        }

        tracing::info!(key, "deleting object");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStorageError::S3Error(Box::new(e)))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(e) => Err(ObjectStorageError::S3Error(Box::new(e))),
        }
    }
}
