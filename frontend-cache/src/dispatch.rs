use crate::error::PurgeError;
use crate::FrontendCache;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use tokio::time::timeout;
use url::Url;

impl FrontendCache {
    /// Tell every configured backend (or only `backend_names`) that `url` is
    /// stale.
    ///
    /// Backends are purged concurrently and each attempt is bounded by its
    /// timeout. Failures are logged per backend and never returned; callers
    /// always see success.
    #[instrument(skip(self, backend_names))]
    pub async fn purge_url(&self, url: &str, backend_names: Option<&BTreeSet<String>>) {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(err) => {
                warn!(?err, "not an absolute url, nothing to purge");
                return;
            }
        };

        // Only possible if the settings changed shape after startup.
        let backends = match self.get_backends(None, backend_names) {
            Ok(backends) => backends,
            Err(err) => {
                error!(%err, "unable to build backends");
                return;
            }
        };

        if backends.is_empty() {
            debug!("no backends configured");
            return;
        }

        let attempts = backends.iter().map(|(name, backend)| {
            let limit = self.timeout_for(name);
            let url = &url;
            async move {
                let res = match timeout(limit, backend.purge(url)).await {
                    Ok(res) => res,
                    Err(_) => Err(PurgeError::Timeout(limit)),
                };
                (name, res)
            }
        });

        for (name, res) in join_all(attempts).await {
            match res {
                Ok(()) => debug!(backend = %name, "purge complete"),
                Err(err) => error!(backend = %name, %err, "unable to purge"),
            }
        }
    }
}
