use super::Purge;
use crate::config::{required, BackendConfig};
use crate::constants::*;
use crate::error::{ConfigError, PurgeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

pub struct CloudflareBackend {
    pub cloudflare_email: String,
    pub cloudflare_token: String,
    pub cloudflare_zoneid: String,
    api_url: Url,
    // Overrides the shared client's timeout when set.
    timeout: Option<Duration>,
    client: reqwest::Client,
}

// Keep the api key out of the logs.
impl fmt::Debug for CloudflareBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareBackend")
            .field("cloudflare_email", &self.cloudflare_email)
            .field("cloudflare_zoneid", &self.cloudflare_zoneid)
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct PurgeFiles<'a> {
    files: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

impl CloudflareBackend {
    pub fn new(config: &BackendConfig, client: reqwest::Client) -> Result<Self, ConfigError> {
        let cloudflare_email = required(&config.email, "EMAIL")?.to_string();
        let cloudflare_token = required(&config.token, "TOKEN")?.to_string();
        let cloudflare_zoneid = required(&config.zone_id, "ZONEID")?.to_string();

        let api_url = match config.api_url.as_deref() {
            Some(api_url) => {
                // join() drops the last segment unless the base ends in a slash.
                let api_url = format!("{}/", api_url.trim_end_matches('/'));
                Url::parse(&api_url).map_err(|source| ConfigError::InvalidUrl {
                    field: "API_URL",
                    source,
                })?
            }
            None => CLOUDFLARE_API_URL.clone(),
        };

        Ok(CloudflareBackend {
            cloudflare_email,
            cloudflare_token,
            cloudflare_zoneid,
            api_url,
            timeout: config.timeout(),
            client,
        })
    }

    fn endpoint(&self) -> Result<Url, PurgeError> {
        self.api_url
            .join(&format!("zones/{}/purge_cache", self.cloudflare_zoneid))
            .map_err(|_| PurgeError::MissingHost(self.api_url.to_string()))
    }
}

#[async_trait::async_trait]
impl Purge for CloudflareBackend {
    #[instrument(skip_all, fields(zone = %self.cloudflare_zoneid))]
    async fn purge(&self, url: &Url) -> Result<(), PurgeError> {
        let endpoint = self.endpoint()?;

        let mut request = self
            .client
            .delete(endpoint.clone())
            .header("X-Auth-Email", self.cloudflare_email.as_str())
            .header("X-Auth-Key", self.cloudflare_token.as_str())
            .json(&PurgeFiles {
                files: [url.as_str()],
            });
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        // 401/403 for bad credentials, 429 when rate limited.
        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::Status {
                url: endpoint.to_string(),
                status,
            });
        }

        let body: ApiResponse = response.json().await?;
        if body.success {
            info!("🧹  purged {}", url.as_str());
            Ok(())
        } else {
            let reasons = body
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join(", ");
            Err(PurgeError::Api(reasons))
        }
    }
}
