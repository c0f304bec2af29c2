//! Cache and CDN integrations.
//!
//! Every backend is built once from a [`BackendConfig`](crate::config::BackendConfig)
//! block and is read-only afterwards, so a single instance can be shared
//! between concurrent purges without locking.

use crate::constants::*;
use crate::error::{ConfigError, PurgeError};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod cloudflare;
pub mod cloudfront;
pub mod http;

pub use self::cloudflare::CloudflareBackend;
pub use self::cloudfront::{AwsInvalidationClient, CloudFrontBackend, InvalidationClient};
pub use self::http::HttpBackend;

/// Something that can be told a url is stale.
#[async_trait::async_trait]
pub trait Purge: Debug + Send + Sync {
    async fn purge(&self, url: &Url) -> Result<(), PurgeError>;
}

#[derive(Debug, Clone)]
pub enum Backend {
    Http(Arc<HttpBackend>),
    CloudFront(Arc<CloudFrontBackend>),
    Cloudflare(Arc<CloudflareBackend>),
    // Registered by the embedding application.
    Custom(Arc<dyn Purge>),
}

impl Backend {
    pub async fn purge(&self, url: &Url) -> Result<(), PurgeError> {
        match self {
            Backend::Http(b) => b.purge(url).await,
            Backend::CloudFront(b) => b.purge(url).await,
            Backend::Cloudflare(b) => b.purge(url).await,
            Backend::Custom(b) => b.purge(url).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Http(_) => "http",
            Backend::CloudFront(_) => "cloudfront",
            Backend::Cloudflare(_) => "cloudflare",
            Backend::Custom(_) => "custom",
        }
    }

    pub fn as_http(&self) -> Option<&HttpBackend> {
        match self {
            Backend::Http(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_cloudfront(&self) -> Option<&CloudFrontBackend> {
        match self {
            Backend::CloudFront(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_cloudflare(&self) -> Option<&CloudflareBackend> {
        match self {
            Backend::Cloudflare(b) => Some(b),
            _ => None,
        }
    }
}

/// Shared collaborators handed to every backend constructor.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub client: reqwest::Client,
    pub invalidations: Arc<dyn InvalidationClient>,
}

impl BackendContext {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .no_proxy()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .redirect(reqwest::redirect::Policy::limited(ALLOW_REDIRECTS))
            .build()
            .map_err(ConfigError::Client)?;

        Ok(BackendContext {
            client,
            invalidations: Arc::new(AwsInvalidationClient::default()),
        })
    }

    pub fn with_invalidations(mut self, invalidations: Arc<dyn InvalidationClient>) -> Self {
        self.invalidations = invalidations;
        self
    }
}
