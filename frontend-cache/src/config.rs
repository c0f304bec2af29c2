use crate::constants::LEGACY_BACKEND_NAME;
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Backend name to backend block, as found under `FRONTENDCACHE`.
pub type BackendSettings = BTreeMap<String, BackendConfig>;

/// A single backend block. Which fields are required depends on `BACKEND`,
/// so they are all optional here and checked when the backend is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BackendConfig {
    pub backend: String,
    pub location: Option<String>,
    pub email: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "ZONEID")]
    pub zone_id: Option<String>,
    pub distribution_id: Option<DistributionId>,
    pub api_url: Option<String>,
    // seconds
    pub timeout: Option<u64>,
}

impl BackendConfig {
    pub fn new(backend: &str) -> Self {
        BackendConfig {
            backend: backend.to_string(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Empty values count as absent.
pub(crate) fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField { field }),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DistributionId {
    /// One distribution fronts every host.
    Global(String),
    /// Hostname to distribution. Hosts not listed are never invalidated.
    PerHost(BTreeMap<String, String>),
}

impl DistributionId {
    pub fn for_host(&self, host: &str) -> Option<&str> {
        match self {
            DistributionId::Global(id) => Some(id.as_str()),
            DistributionId::PerHost(map) => map.get(host).map(String::as_str),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            DistributionId::Global(id) => id.trim().is_empty(),
            DistributionId::PerHost(map) => map.is_empty(),
        }
    }
}

/// The process wide settings document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(rename = "FRONTENDCACHE", default)]
    pub frontend_cache: BackendSettings,
    // Older deployments only ever had a single http cache.
    #[serde(rename = "FRONTENDCACHE_LOCATION", default)]
    pub frontend_cache_location: Option<String>,
}

impl Settings {
    pub fn parse<P: AsRef<Path>>(config_path: P) -> Result<Option<Settings>, ConfigError> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let mut contents = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
            .inspect_err(|err| error!(?err))?;

        toml::from_str(contents.as_str())
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
            .inspect_err(|err| error!(?err))
    }

    /// An explicit legacy location, e.g. from the environment. Only used when
    /// no named backends are configured.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        if location.is_some() {
            self.frontend_cache_location = location;
        }
        self
    }

    /// Normalise both accepted shapes into named backends. A flat legacy
    /// location becomes one http backend called `default`.
    pub fn backend_settings(&self) -> BackendSettings {
        if !self.frontend_cache.is_empty() {
            return self.frontend_cache.clone();
        }

        let mut settings = BackendSettings::new();
        if let Some(location) = self.frontend_cache_location.as_ref() {
            let mut config = BackendConfig::new("http");
            config.location = Some(location.clone());
            settings.insert(LEGACY_BACKEND_NAME.to_string(), config);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn settings_named_backends() {
        let settings: Settings = toml::from_str(
            r#"
            [FRONTENDCACHE.varnish]
            BACKEND = "http"
            LOCATION = "http://localhost:8000"

            [FRONTENDCACHE.cdn]
            BACKEND = "cloudfront"
            DISTRIBUTION_ID = { "www.example.com" = "frontend" }
            TIMEOUT = 3
            "#,
        )
        .unwrap();

        let backends = settings.backend_settings();
        assert_eq!(backends.len(), 2);
        assert_eq!(
            backends["varnish"].location.as_deref(),
            Some("http://localhost:8000")
        );

        let cdn = &backends["cdn"];
        assert_eq!(cdn.timeout(), Some(Duration::from_secs(3)));
        let dist = cdn.distribution_id.as_ref().unwrap();
        assert_eq!(dist.for_host("www.example.com"), Some("frontend"));
        assert_eq!(dist.for_host("other.com"), None);
    }

    #[test]
    fn settings_scalar_distribution_id() {
        let settings: BackendSettings = toml::from_str(
            r#"
            [cdn]
            BACKEND = "cloudfront"
            DISTRIBUTION_ID = "frontend"
            "#,
        )
        .unwrap();

        let dist = settings["cdn"].distribution_id.as_ref().unwrap();
        assert_eq!(dist, &DistributionId::Global("frontend".to_string()));
        assert_eq!(dist.for_host("anything.example"), Some("frontend"));
    }

    #[test]
    fn settings_legacy_location() {
        let settings: Settings =
            toml::from_str(r#"FRONTENDCACHE_LOCATION = "http://localhost:8000""#).unwrap();

        let backends = settings.backend_settings();
        assert_eq!(backends.len(), 1);
        let default = &backends[LEGACY_BACKEND_NAME];
        assert_eq!(default.backend, "http");
        assert_eq!(default.location.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn settings_named_backends_win_over_legacy() {
        let settings: Settings = toml::from_str(
            r#"
            FRONTENDCACHE_LOCATION = "http://localhost:8000"

            [FRONTENDCACHE.varnish]
            BACKEND = "http"
            LOCATION = "http://varnish:6081"
            "#,
        )
        .unwrap();

        let backends = settings.backend_settings();
        assert_eq!(backends.keys().collect::<Vec<_>>(), vec!["varnish"]);
    }

    #[test]
    fn settings_empty() {
        assert!(Settings::default().backend_settings().is_empty());
        let settings = Settings::default().with_location(None);
        assert!(settings.backend_settings().is_empty());
        let settings = Settings::default().with_location(Some("http://cache".to_string()));
        assert_eq!(settings.backend_settings().len(), 1);
    }

    #[test]
    fn settings_parse_file() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[FRONTENDCACHE.cloudflare]\nBACKEND = \"cloudflare\"\nEMAIL = \"test@test.com\"\nTOKEN = \"token\"\nZONEID = \"zone\""
        )
        .unwrap();

        let settings = Settings::parse(file.path()).unwrap().unwrap();
        let cloudflare = &settings.backend_settings()["cloudflare"];
        assert_eq!(cloudflare.zone_id.as_deref(), Some("zone"));

        assert!(Settings::parse("/nonexistent/frontend-cache.toml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn settings_parse_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // BACKEND is always required
        writeln!(file, "[FRONTENDCACHE.varnish]\nLOCATION = \"http://localhost\"").unwrap();

        assert!(matches!(
            Settings::parse(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn required_treats_blank_as_missing() {
        assert!(required(&Some("  ".to_string()), "EMAIL").is_err());
        assert!(required(&None, "EMAIL").is_err());
        assert_eq!(required(&Some("a".to_string()), "EMAIL").unwrap(), "a");
    }
}
