use crate::backend::*;
use crate::config::BackendConfig;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type Constructor =
    Arc<dyn Fn(&BackendConfig, &BackendContext) -> Result<Backend, ConfigError> + Send + Sync>;

/// Maps `BACKEND` identifiers to the function that builds that backend.
#[derive(Clone)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        BackendRegistry::empty()
            .register("http", |config, ctx| {
                HttpBackend::new(config, ctx.client.clone()).map(|b| Backend::Http(Arc::new(b)))
            })
            .register("cloudfront", |config, ctx| {
                CloudFrontBackend::new(config, ctx.invalidations.clone())
                    .map(|b| Backend::CloudFront(Arc::new(b)))
            })
            .register("cloudflare", |config, ctx| {
                CloudflareBackend::new(config, ctx.client.clone())
                    .map(|b| Backend::Cloudflare(Arc::new(b)))
            })
    }
}

/// `http`, `HTTPBackend` and `some::path::HttpBackend` all name the same
/// backend.
fn normalise(identifier: &str) -> String {
    let last = identifier
        .rsplit(|c: char| c == '.' || c == ':')
        .next()
        .unwrap_or(identifier)
        .trim()
        .to_ascii_lowercase();

    match last.strip_suffix("backend") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => last,
    }
}

impl BackendRegistry {
    pub fn empty() -> Self {
        BackendRegistry {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register<F>(mut self, identifier: &str, constructor: F) -> Self
    where
        F: Fn(&BackendConfig, &BackendContext) -> Result<Backend, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(normalise(identifier), Arc::new(constructor));
        self
    }

    pub fn build(
        &self,
        config: &BackendConfig,
        context: &BackendContext,
    ) -> Result<Backend, ConfigError> {
        let constructor = self
            .constructors
            .get(&normalise(&config.backend))
            .ok_or_else(|| ConfigError::UnknownBackend(config.backend.clone()))?;
        constructor(config, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_PURGE_TIMEOUT;

    #[test]
    fn registry_identifiers() {
        assert_eq!(normalise("http"), "http");
        assert_eq!(normalise("HTTPBackend"), "http");
        assert_eq!(normalise("frontend_cache::backend::CloudflareBackend"), "cloudflare");
        assert_eq!(normalise("contrib.frontendcache.backends.CloudfrontBackend"), "cloudfront");
        assert_eq!(normalise("backend"), "backend");
        assert_eq!(normalise("CloudFront"), "cloudfront");
    }

    #[test]
    fn registry_unknown_backend() {
        let ctx = BackendContext::new(DEFAULT_PURGE_TIMEOUT).unwrap();
        match BackendRegistry::default().build(&BackendConfig::new("akamai"), &ctx) {
            Err(ConfigError::UnknownBackend(id)) => assert_eq!(id, "akamai"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn registry_builds_by_identifier() {
        let ctx = BackendContext::new(DEFAULT_PURGE_TIMEOUT).unwrap();
        let mut config = BackendConfig::new("HTTPBackend");
        config.location = Some("http://localhost:8000".to_string());

        let backend = BackendRegistry::default().build(&config, &ctx).unwrap();
        assert_eq!(backend.kind(), "http");
        assert_eq!(backend.as_http().unwrap().cache_netloc, "localhost:8000");
    }
}
