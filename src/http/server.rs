//! HTTP hosting for a [`Router`].
//!
//! # Responsibilities
//! - Build the axum app whose fallback hands every request to the dispatcher
//! - Wire up tower layers (request ID, tracing, timeout)
//! - Buffer the request body under the configured limit
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - A single fallback: all routing decisions belong to the dispatcher
//! - Each request gets a `CancellationToken` guarded by a drop guard, so a
//!   dropped connection cancels any running loader

use std::io;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::RouterConfig;
use crate::http::dispatcher::Router;
use crate::http::request::UuidRequestId;

/// State shared with the fallback handler.
#[derive(Clone)]
struct HostState {
    router: Router,
    max_body_size: usize,
}

pub struct HttpServer {
    app: axum::Router,
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router, config: &RouterConfig) -> Self {
        let app = Self::build_app(router.clone(), config);
        Self { app, router }
    }

    #[allow(deprecated)]
    fn build_app(router: Router, config: &RouterConfig) -> axum::Router {
        let state = HostState {
            router,
            max_body_size: config.limits.max_body_size,
        };

        axum::Router::new().fallback(dispatch_handler).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
        )
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The fully layered axum app, for embedding or in-process tests.
    pub fn into_app(self) -> axum::Router {
        self.app
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight
    /// requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.router.routes().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(State(state): State<HostState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(
                path = %parts.uri.path(),
                limit = state.max_body_size,
                error = %err,
                "Request body rejected"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n").into_response();
        }
    };

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    state
        .router
        .dispatch(Request::from_parts(parts, body), cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server(router: Router, config: RouterConfig) -> axum::Router {
        HttpServer::new(router, &config).into_app()
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_propagated() {
        let router = Router::new();
        let _ = router.get("/", |ctx| Ok(ctx.request_id().unwrap_or("none").to_string()));

        let response = server(router, RouterConfig::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers()["x-request-id"].to_str().unwrap().to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(header.len(), 36);
        assert_eq!(body, header.as_bytes());
    }

    #[tokio::test]
    async fn test_client_request_id_is_kept() {
        let router = Router::new();
        let _ = router.get("/", |_ctx| Ok("ok"));

        let response = server(router, RouterConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let router = Router::new();
        let _ = router.post("/upload", |ctx| Ok(format!("{} bytes", ctx.body().len())));

        let mut config = RouterConfig::default();
        config.limits.max_body_size = 8;

        let app = server(router, config);
        let ok = app
            .clone()
            .oneshot(Request::post("/upload").body(Body::from("small")).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let rejected = app
            .oneshot(Request::post("/upload").body(Body::from("far too large")).unwrap())
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
