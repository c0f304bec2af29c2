use super::Purge;
use crate::config::{required, BackendConfig};
use crate::constants::*;
use crate::error::{ConfigError, PurgeError};
use reqwest::header::{HeaderValue, HOST};
use std::time::Duration;
use url::{Position, Url};

/// A reverse proxy (varnish, squid, nginx) that accepts `PURGE` requests.
#[derive(Debug)]
pub struct HttpBackend {
    pub cache_scheme: String,
    // host[:port]
    pub cache_netloc: String,
    // Overrides the shared client's timeout when set.
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, client: reqwest::Client) -> Result<Self, ConfigError> {
        let location = required(&config.location, "LOCATION")?;
        let location = Url::parse(location.trim_end_matches('/')).map_err(|source| {
            ConfigError::InvalidUrl {
                field: "LOCATION",
                source,
            }
        })?;

        let cache_netloc =
            netloc(&location).ok_or(ConfigError::MissingHost { field: "LOCATION" })?;

        Ok(HttpBackend {
            cache_scheme: location.scheme().to_string(),
            cache_netloc,
            timeout: config.timeout(),
            client,
        })
    }

    /// The url with its scheme and host swapped for the cache's, keeping the
    /// path, query and fragment.
    pub fn cache_url(&self, url: &Url) -> Result<Url, PurgeError> {
        let rewritten = format!(
            "{}://{}{}",
            self.cache_scheme,
            self.cache_netloc,
            &url[Position::BeforePath..]
        );
        Url::parse(&rewritten).map_err(|_| PurgeError::MissingHost(rewritten))
    }
}

fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[async_trait::async_trait]
impl Purge for HttpBackend {
    #[instrument(skip_all, fields(cache = %self.cache_netloc))]
    async fn purge(&self, url: &Url) -> Result<(), PurgeError> {
        let host = netloc(url).ok_or_else(|| PurgeError::MissingHost(url.to_string()))?;
        let target = self.cache_url(url)?;

        // The cache keys objects on the public host, not on its own address.
        let host = HeaderValue::from_str(&host).map_err(|_| PurgeError::MissingHost(host))?;

        debug!("PURGE {} (host {:?})", target.as_str(), host);
        let mut request = self
            .client
            .request(PURGE_METHOD.clone(), target.clone())
            .header(HOST, host);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            info!("🧹  purged {}", url.as_str());
            Ok(())
        } else {
            Err(PurgeError::Status {
                url: target.to_string(),
                status,
            })
        }
    }
}
