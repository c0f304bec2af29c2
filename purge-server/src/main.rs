#[macro_use]
extern crate tracing;

use axum::{
    extract,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use frontend_cache::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Span;

struct AppState {
    cache: FrontendCache,
}

/// Sent by the content system whenever a page becomes public, changes, or
/// is withdrawn. `url` is absent for pages that have no public route.
#[derive(Debug, Deserialize)]
struct PageEvent {
    url: Option<String>,
    backends: Option<BTreeSet<String>>,
}

impl Routable for PageEvent {
    fn full_url(&self) -> Option<String> {
        self.url.clone()
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    backends: Vec<BackendStatus>,
}

#[derive(Debug, Serialize)]
struct BackendStatus {
    name: String,
    kind: &'static str,
}

async fn handle_event(state: &AppState, event: Lifecycle, page: PageEvent) -> Response {
    state
        .cache
        .page_event(event, &page, page.backends.as_ref())
        .await;

    // Publishing never fails because of a cache.
    StatusCode::ACCEPTED.into_response()
}

#[instrument(skip_all)]
async fn publish_view(
    extract::State(state): extract::State<Arc<AppState>>,
    Json(page): Json<PageEvent>,
) -> Response {
    handle_event(&state, Lifecycle::Published, page).await
}

#[instrument(skip_all)]
async fn unpublish_view(
    extract::State(state): extract::State<Arc<AppState>>,
    Json(page): Json<PageEvent>,
) -> Response {
    handle_event(&state, Lifecycle::Unpublished, page).await
}

async fn status_view(extract::State(state): extract::State<Arc<AppState>>) -> Response {
    match state.cache.get_backends(None, None) {
        Ok(backends) => Json(StatusResponse {
            backends: backends
                .iter()
                .map(|(name, backend)| BackendStatus {
                    name: name.clone(),
                    kind: backend.kind(),
                })
                .collect(),
        })
        .into_response(),
        Err(err) => {
            error!(%err, "unable to build backends");
            (StatusCode::INTERNAL_SERVER_ERROR, "Invalid Configuration").into_response()
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/publish", post(publish_view))
        .route("/unpublish", post(unpublish_view))
        .route("/_status", get(status_view))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|_request: &Request<_>| tracing::info_span!("http-request"))
                .on_request(|request: &Request<_>, _span: &Span| {
                    tracing::info!("started {} {}", request.method(), request.uri().path())
                })
                .on_response(|_response: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!("response generated in {:?}", latency)
                }),
        )
        .with_state(state)
}

#[derive(Debug, clap::Parser)]
#[command(about = "Front-end cache purge service")]
struct Config {
    #[arg(env = "BIND_ADDRESS", default_value = "[::]:8080", long = "addr")]
    /// Address to listen to for http
    bind_addr: String,

    #[arg(
        env = "FRONTENDCACHE_CONFIG",
        default_value = "/etc/frontend-cache.toml",
        long = "config"
    )]
    /// Path to the backend settings file.
    config_path: PathBuf,

    #[arg(env = "FRONTENDCACHE_LOCATION", long = "location")]
    /// Url of a single http cache. Ignored when the settings file names any
    /// backends.
    location: Option<String>,

    #[arg(env = "PURGE_TIMEOUT", default_value = "10", long = "timeout")]
    /// Seconds to wait on any one backend before giving up.
    timeout: u64,
}

fn load_cache(config: &Config) -> Result<FrontendCache, ConfigError> {
    let settings = Settings::parse(&config.config_path)?
        .unwrap_or_else(|| {
            info!(path = ?config.config_path, "no settings file");
            Settings::default()
        })
        .with_location(config.location.clone());

    let timeout = Duration::from_secs(config.timeout);
    FrontendCache::with_registry(
        settings.backend_settings(),
        BackendRegistry::default(),
        BackendContext::new(timeout)?,
    )
    .map(|cache| cache.with_timeout(timeout))
}

async fn do_main() {
    let config = Config::parse();

    // A misconfigured backend is an operator error, refuse to start.
    let cache = match load_cache(&config) {
        Ok(cache) => cache,
        Err(err) => {
            error!(%err, "Unable to configure frontend cache");
            std::process::exit(1);
        }
    };

    let app_state = Arc::new(AppState { cache });

    let addr = match SocketAddr::from_str(&config.bind_addr) {
        Ok(addr) => addr,
        Err(err) => {
            error!(?err, "Invalid config bind address");
            std::process::exit(1);
        }
    };
    info!("Binding -> http://{}", config.bind_addr);

    let (tx, mut rx1) = broadcast::channel(1);

    let svc = app(app_state).into_make_service();
    let server_handle = tokio::task::spawn(async move {
        tokio::select! {
            _ = rx1.recv() => {
                return
            }
            res = axum_server::bind(addr).serve(svc) => {
                if let Err(err) = res {
                    error!(?err, "Server failed");
                }
            }
        }
        info!("Server has stopped!");
    });

    // Block for signals now

    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => {}
        Some(()) = async move {
            let sigterm = tokio::signal::unix::SignalKind::terminate();
            match tokio::signal::unix::signal(sigterm) {
                Ok(mut signal) => signal.recv().await,
                Err(_) => None,
            }
        } => {}
    }

    info!("Stopping ...");
    // Purges still in flight are abandoned.
    let _ = tx.send(true);
    let _ = server_handle.await;
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    let fmt_layer = tracing_forest::ForestLayer::default();

    Registry::default().with(filter_layer).with(fmt_layer).init();

    do_main().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let mut settings = BTreeMap::new();
        let mut varnish = BackendConfig::new("http");
        // Nothing listens here, so every purge fails.
        varnish.location = Some("http://127.0.0.1:9".to_string());
        settings.insert("varnish".to_string(), varnish);

        let cache = FrontendCache::new(settings)
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        Arc::new(AppState { cache })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn publish_accepted_despite_backend_failure() {
        let response = app(state())
            .oneshot(post_json(
                "/publish",
                r#"{"url": "http://localhost/events/"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unpublish_unroutable_page() {
        let response = app(state())
            .oneshot(post_json("/unpublish", r#"{"url": null}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app(state())
            .oneshot(post_json(
                "/unpublish",
                r#"{"url": null, "backends": ["varnish"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn status_lists_backends() {
        let response = app(state())
            .oneshot(
                http::Request::builder()
                    .uri("/_status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "backends": [{ "name": "varnish", "kind": "http" }] })
        );
    }
}
