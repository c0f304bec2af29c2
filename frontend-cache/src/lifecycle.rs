use crate::FrontendCache;
use std::collections::BTreeSet;
use std::fmt;

/// Content that may have a public url. Content that isn't reachable from any
/// site yet returns `None`.
pub trait Routable {
    fn full_url(&self) -> Option<String>;
}

impl Routable for Option<String> {
    fn full_url(&self) -> Option<String> {
        self.clone()
    }
}

impl Routable for str {
    fn full_url(&self) -> Option<String> {
        Some(self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Published,
    Unpublished,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Published => write!(f, "published"),
            Lifecycle::Unpublished => write!(f, "unpublished"),
        }
    }
}

impl FrontendCache {
    /// Purge the page's public url from every backend, or only the named
    /// `backends`.
    pub async fn purge_page<P: Routable + ?Sized>(
        &self,
        page: &P,
        backends: Option<&BTreeSet<String>>,
    ) {
        match page.full_url() {
            Some(url) => self.purge_url(&url, backends).await,
            None => debug!("page has no public url, nothing to purge"),
        }
    }

    #[instrument(skip_all, fields(event = %event))]
    pub async fn page_event<P: Routable + ?Sized>(
        &self,
        event: Lifecycle,
        page: &P,
        backends: Option<&BTreeSet<String>>,
    ) {
        self.purge_page(page, backends).await
    }

    pub async fn page_published<P: Routable + ?Sized>(&self, page: &P) {
        self.page_event(Lifecycle::Published, page, None).await
    }

    pub async fn page_unpublished<P: Routable + ?Sized>(&self, page: &P) {
        self.page_event(Lifecycle::Unpublished, page, None).await
    }
}
