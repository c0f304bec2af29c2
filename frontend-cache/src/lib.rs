//! Front-end cache purging.
//!
//! When published content changes, every configured cache layer (reverse
//! proxies, CDN edges) is told the page's url is stale. Backends are built
//! from named [`BackendConfig`] blocks, and a purge fans out to all of them
//! with each attempt isolated from the others.

#[macro_use]
extern crate tracing;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub mod backend;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub mod prelude {
    pub use crate::backend::{Backend, BackendContext, Purge};
    pub use crate::config::{BackendConfig, BackendSettings, DistributionId, Settings};
    pub use crate::error::{ConfigError, PurgeError};
    pub use crate::lifecycle::{Lifecycle, Routable};
    pub use crate::registry::BackendRegistry;
    pub use crate::FrontendCache;
}

use crate::backend::{Backend, BackendContext};
use crate::config::BackendSettings;
use crate::constants::DEFAULT_PURGE_TIMEOUT;
use crate::error::ConfigError;
use crate::registry::BackendRegistry;

#[derive(Debug)]
pub struct FrontendCache {
    settings: BackendSettings,
    registry: BackendRegistry,
    context: BackendContext,
    timeout: Duration,
}

impl FrontendCache {
    /// Build with the stock backends. Every configured backend is constructed
    /// once up front, so operator mistakes are reported here rather than on
    /// the first purge.
    pub fn new(settings: BackendSettings) -> Result<Self, ConfigError> {
        let context = BackendContext::new(DEFAULT_PURGE_TIMEOUT)?;
        FrontendCache::with_registry(settings, BackendRegistry::default(), context)
    }

    pub fn with_registry(
        settings: BackendSettings,
        registry: BackendRegistry,
        context: BackendContext,
    ) -> Result<Self, ConfigError> {
        let cache = FrontendCache {
            settings,
            registry,
            context,
            timeout: DEFAULT_PURGE_TIMEOUT,
        };

        let backends = cache.get_backends(None, None)?;
        let names: Vec<&String> = backends.keys().collect();
        info!(backends = ?names, "frontend cache configured");
        Ok(cache)
    }

    /// Default upper bound on a single backend's purge. A backend's own
    /// `TIMEOUT` takes precedence.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn timeout_for(&self, name: &str) -> Duration {
        self.settings
            .get(name)
            .and_then(|config| config.timeout())
            .unwrap_or(self.timeout)
    }

    /// Build the named backends from `backend_settings`, or from the process
    /// settings when `None`. `backends` limits the result to those names;
    /// names that aren't configured are ignored. A fresh set is built on
    /// every call.
    pub fn get_backends(
        &self,
        backend_settings: Option<&BackendSettings>,
        backends: Option<&BTreeSet<String>>,
    ) -> Result<BTreeMap<String, Backend>, ConfigError> {
        backend_settings
            .unwrap_or(&self.settings)
            .iter()
            .filter(|(name, _)| backends.map_or(true, |wanted| wanted.contains(*name)))
            .map(|(name, config)| {
                self.registry
                    .build(config, &self.context)
                    .map(|backend| (name.clone(), backend))
                    .map_err(|err| err.for_backend(name))
            })
            .collect()
    }
}
