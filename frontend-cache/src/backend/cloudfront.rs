use super::Purge;
use crate::config::{BackendConfig, DistributionId};
use crate::error::{ConfigError, PurgeError};
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use std::fmt::Debug;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use url::Url;

/// The remote half of a CloudFront purge. Split out of the backend so the
/// host routing can be exercised without talking to AWS.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InvalidationClient: Debug + Send + Sync {
    async fn create_invalidation(&self, distribution_id: &str, path: &str)
        -> Result<(), PurgeError>;
}

/// Talks to the CloudFront API with credentials from the usual AWS
/// environment chain. The SDK client is only built on first use.
#[derive(Debug, Default)]
pub struct AwsInvalidationClient {
    client: OnceCell<aws_sdk_cloudfront::Client>,
}

impl AwsInvalidationClient {
    async fn client(&self) -> &aws_sdk_cloudfront::Client {
        self.client
            .get_or_init(|| async {
                let config = aws_config::load_from_env().await;
                aws_sdk_cloudfront::Client::new(&config)
            })
            .await
    }
}

#[async_trait::async_trait]
impl InvalidationClient for AwsInvalidationClient {
    #[instrument(skip(self))]
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        path: &str,
    ) -> Result<(), PurgeError> {
        // Must be unique per request, or CloudFront treats it as a replay.
        let caller_reference = OffsetDateTime::now_utc().unix_timestamp_nanos().to_string();

        let paths = Paths::builder()
            .quantity(1)
            .items(path)
            .build()
            .map_err(|e| PurgeError::Invalidation(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(|e| PurgeError::Invalidation(e.to_string()))?;

        let output = self
            .client()
            .await
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| PurgeError::Invalidation(DisplayErrorContext(&e).to_string()))?;

        let invalidation_id = output.invalidation().map(|i| i.id().to_string());
        info!(?invalidation_id, "🧹  invalidation created");
        Ok(())
    }
}

#[derive(Debug)]
pub struct CloudFrontBackend {
    pub cloudfront_distribution_id: DistributionId,
    invalidations: Arc<dyn InvalidationClient>,
}

impl CloudFrontBackend {
    pub fn new(
        config: &BackendConfig,
        invalidations: Arc<dyn InvalidationClient>,
    ) -> Result<Self, ConfigError> {
        let cloudfront_distribution_id = config
            .distribution_id
            .as_ref()
            .filter(|d| !d.is_empty())
            .cloned()
            .ok_or(ConfigError::MissingField {
                field: "DISTRIBUTION_ID",
            })?;

        Ok(CloudFrontBackend {
            cloudfront_distribution_id,
            invalidations,
        })
    }
}

#[async_trait::async_trait]
impl Purge for CloudFrontBackend {
    async fn purge(&self, url: &Url) -> Result<(), PurgeError> {
        let host = url
            .host_str()
            .ok_or_else(|| PurgeError::MissingHost(url.to_string()))?;

        match self.cloudfront_distribution_id.for_host(host) {
            Some(distribution_id) => {
                self.invalidations
                    .create_invalidation(distribution_id, url.path())
                    .await
            }
            None => {
                debug!(%host, "no distribution for host, skipping");
                Ok(())
            }
        }
    }
}
