use reqwest::Method;
use std::time::Duration;
use url::Url;

pub const USER_AGENT: &str = concat!("frontend-cache/", env!("CARGO_PKG_VERSION"));

// Upper bound on any single backend purge, so an unreachable cache can't
// stall publishing.
pub const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
pub const ALLOW_REDIRECTS: usize = 4;

// Name given to the backend built from the flat legacy location setting.
pub const LEGACY_BACKEND_NAME: &str = "default";

lazy_static::lazy_static! {
    // Understood by varnish, squid and nginx (with ngx_cache_purge).
    pub static ref PURGE_METHOD: Method =
        Method::from_bytes(b"PURGE").expect("Invalid purge method");

    pub static ref CLOUDFLARE_API_URL: Url =
        Url::parse("https://api.cloudflare.com/client/v4/").expect("Invalid base url");
}
