//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, timeouts, request ID)
//! - Run each transaction through a fresh filter instance
//! - Forward requests to the upstream
//! - Apply filter configuration reloads

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::binding::CloudEventsBinder;
use crate::config::validation::{parse_upstream, ValidationError};
use crate::config::{FilterConfig, ProxyConfig};
use crate::filter::{EventsConvertFilter, TransactionContext};
use crate::http::driver::{self, DriveError};
use crate::lifecycle::signals::shutdown_signal;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
    pub filter_config: Arc<ArcSwap<FilterConfig>>,
    pub binder: Arc<CloudEventsBinder>,
    pub max_body_size: usize,
}

/// HTTP server for the converting proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    filter_config: Arc<ArcSwap<FilterConfig>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails when the upstream address is not a `host:port` authority.
    pub fn new(config: ProxyConfig) -> Result<Self, ValidationError> {
        let upstream = parse_upstream(&config.upstream.address)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let filter_config = Arc::new(ArcSwap::from_pointee(config.filter.clone()));

        let state = AppState {
            client,
            upstream,
            filter_config: filter_config.clone(),
            binder: Arc::new(CloudEventsBinder),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            filter_config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires, applying configuration
    /// updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            content_type = %self.config.filter.content_type,
            "HTTP server starting"
        );

        spawn_config_reloader(config_updates, self.filter_config.clone(), self.config.clone());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn spawn_config_reloader(
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    filter_config: Arc<ArcSwap<FilterConfig>>,
    running: ProxyConfig,
) {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            apply_config_update(&filter_config, &running, &update);
        }
    });
}

/// Swap in the new filter section. Returns whether anything changed.
///
/// Transactions already in flight keep the configuration they started with.
pub(crate) fn apply_config_update(
    filter_config: &ArcSwap<FilterConfig>,
    running: &ProxyConfig,
    update: &ProxyConfig,
) -> bool {
    if running.listener != update.listener
        || running.upstream != update.upstream
        || running.timeouts != update.timeouts
        || running.limits != update.limits
        || running.observability != update.observability
    {
        tracing::warn!("Configuration changed outside [filter]; restart to apply it");
    }

    if **filter_config.load() == update.filter {
        return false;
    }

    tracing::info!(
        content_type = %update.filter.content_type,
        "Filter configuration reloaded"
    );
    filter_config.store(Arc::new(update.filter.clone()));
    true
}

/// Main proxy handler.
/// Runs the request phase, forwards upstream, then runs the response phase.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %request_id,
        client = %client_addr,
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );

    let mut filter = EventsConvertFilter::new(state.filter_config.load_full(), state.binder.clone());
    let mut cx = TransactionContext::new();

    // 1. Request phase
    let (mut parts, body) = request.into_parts();
    let body = match driver::drive_request(
        &mut filter,
        &mut cx,
        &mut parts.headers,
        body,
        state.max_body_size,
    )
    .await
    {
        Ok(body) => body,
        Err(DriveError::TooLarge { limit }) => {
            tracing::warn!(request_id = %request_id, limit, "Request body exceeds buffering limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    // 2. URI rewrite
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
        }
    };
    parts.version = Version::HTTP_11;

    // 3. Forward
    let response: Response<Incoming> = match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    // 4. Response phase
    let (mut parts, body) = response.into_parts();
    let body = match driver::drive_response(
        &mut filter,
        &cx,
        parts.status,
        &mut parts.headers,
        body,
        state.max_body_size,
    )
    .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to process upstream response");
            return (StatusCode::BAD_GATEWAY, "Upstream response could not be processed").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        status = %parts.status,
        converted = cx.is_converted(),
        "Request completed"
    );
    Response::from_parts(parts, body)
}
