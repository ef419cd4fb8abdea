//! API server setup and configuration.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::routes;
use crate::config::ApiSettings;
use crate::scheduler::StatusHandle;
use crate::{Error, Result};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: SocketAddr,
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

impl TryFrom<&ApiSettings> for ApiServerConfig {
    type Error = Error;

    fn try_from(settings: &ApiSettings) -> Result<Self> {
        let bind_address = settings
            .bind
            .parse()
            .map_err(|e| Error::config(format!("invalid api.bind '{}': {e}", settings.bind)))?;
        Ok(Self {
            bind_address,
            ..Default::default()
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub status: StatusHandle,
}

impl AppState {
    pub fn new(status: StatusHandle) -> Self {
        Self {
            start_time: Instant::now(),
            status,
        }
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Build the router with all middleware and routes.
    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        // Health probes are polled often; keep them out of the request log.
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/api/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::DEBUG);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| Error::Other(format!("Failed to bind {}: {e}", self.config.bind_address)))?;

        tracing::info!("API server listening on http://{}", self.config.bind_address);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address.port(), 8080);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ApiSettings {
            enabled: true,
            bind: "0.0.0.0:9000".into(),
        };
        let config = ApiServerConfig::try_from(&settings).unwrap();
        assert_eq!(config.bind_address.port(), 9000);

        let bad = ApiSettings {
            enabled: true,
            bind: "localhost".into(),
        };
        assert!(ApiServerConfig::try_from(&bad).is_err());
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let token = CancellationToken::new();
        let server = ApiServer::new(
            ApiServerConfig {
                bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
                enable_cors: false,
            },
            AppState::new(StatusHandle::new()),
            token.clone(),
        );
        token.cancel();
        server.run().await.unwrap();
    }
}
