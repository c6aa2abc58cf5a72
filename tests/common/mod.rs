//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Bytes};
use axum::http::{Method, Request, StatusCode};
use page_router::config::RouterConfig;
use page_router::http::{from_fn, Middleware};
use page_router::lifecycle::Shutdown;
use page_router::{HttpServer, Router};
use tokio::net::TcpListener;

/// Status and body of a dispatched request.
pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: String,
}

/// Dispatch an in-process request with an empty body.
pub async fn send(router: &Router, method: Method, path: &str) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .unwrap();
    let response = router.handle(request).await;

    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub async fn get(router: &Router, path: &str) -> Reply {
    send(router, Method::GET, path).await
}

/// Ordered record of middleware and handler events.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Middleware that records `{name}-before` and `{name}-after`.
    pub fn layer(&self, name: &'static str) -> impl Middleware {
        let trace = self.clone();
        from_fn(move |ctx, next| {
            trace.push(format!("{name}-before"));
            let result = next(ctx);
            trace.push(format!("{name}-after"));
            result
        })
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router, config: RouterConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(router, &config);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}
