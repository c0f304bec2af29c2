use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Operator errors found while loading settings or building backends. These
/// are fatal and must stop configuration from loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} is not a valid url: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be an absolute url with a host")]
    MissingHost { field: &'static str },
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
    #[error("backend '{name}' is improperly configured: {source}")]
    Backend {
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("unable to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("unable to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn for_backend(self, name: &str) -> Self {
        ConfigError::Backend {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// A failed purge attempt. Always recoverable; the dispatcher logs these and
/// carries on with the remaining backends.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} responded {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("purge api rejected the request: {0}")]
    Api(String),
    #[error("unable to create invalidation: {0}")]
    Invalidation(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0} has no host")]
    MissingHost(String),
}
