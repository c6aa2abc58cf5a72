//! page-router demonstration server.
//!
//! ```text
//! CLI (--config, --bind)
//!     → load + validate RouterConfig
//!     → logging / metrics init
//!     → Router::from_config + demo site registration
//!     → HttpServer::run until SIGINT/SIGTERM
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use page_router::config::load_config;
use page_router::http::{from_fn, log_requests, recover, BoxRenderable, LayoutError};
use page_router::lifecycle::{spawn_signal_listener, Shutdown};
use page_router::observability::{logging, metrics};
use page_router::{
    render_fn, DispatchError, HttpServer, Json, Params, Renderable, RequestContext, RouteMeta,
    Router, RouterConfig,
};

#[derive(Parser, Debug)]
#[command(name = "page-router", version, about = "Serve the page-router demonstration site")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "page-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_path = %config.router.base_path,
        loader_timeout_ms = config.router.loader_timeout_ms,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let router = Router::from_config(&config.router);
    register_site(&router)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    HttpServer::new(router, &config)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[derive(Debug)]
struct User {
    id: u64,
    name: String,
}

async fn load_user(cancel: CancellationToken, params: Params) -> Result<User, DispatchError> {
    let id: u64 = params
        .get("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| DispatchError::bad_request("user id must be a number"))?;

    // Stand-in for a database round trip.
    tokio::select! {
        _ = cancel.cancelled() => {
            Err(DispatchError::new(StatusCode::REQUEST_TIMEOUT, "lookup cancelled"))
        }
        _ = tokio::time::sleep(Duration::from_millis(5)) => match id {
            0 => Err(DispatchError::not_found("no user 0")),
            id => Ok(User { id, name: format!("user-{id}") }),
        },
    }
}

fn page_title(ctx: &RequestContext) -> String {
    ctx.meta()
        .and_then(|meta| meta.title.clone())
        .unwrap_or_else(|| "page-router".to_string())
}

fn register_site(router: &Router) -> Result<(), LayoutError> {
    router.register_layout("root", None, |ctx, content: BoxRenderable| {
        let title = page_title(ctx);
        render_fn(move |out| {
            write!(out, "<!doctype html><html><head><title>{title}</title></head><body>")?;
            content.render(out)?;
            write!(out, "</body></html>")
        })
    })?;
    router.register_layout("dashboard", Some("root"), |_ctx, content: BoxRenderable| {
        render_fn(move |out| {
            write!(
                out,
                "<nav><a href=\"/dashboard\">Overview</a> \
                 <a href=\"/dashboard/settings\">Settings</a></nav><main>"
            )?;
            content.render(out)?;
            write!(out, "</main>")
        })
    })?;
    router.set_default_layout(Some("root"));

    router.middleware(recover()).middleware(log_requests());

    router.error_page(StatusCode::NOT_FOUND, |ctx, _err| {
        format!("<h1>Not found</h1><p>Nothing lives at {}.</p>", ctx.path())
    });

    let _ = router
        .get("/", |ctx| {
            let user_url = ctx
                .router()
                .url("user", [1])
                .map_err(DispatchError::internal)?;
            Ok(format!("<h1>Welcome</h1><p><a href=\"{user_url}\">First user</a></p>"))
        })
        .name("home")
        .meta(RouteMeta::new("Home").description("page-router demonstration site"));

    let _ = router
        .get("/users/:id", |ctx| {
            let user = ctx
                .data::<User>()
                .ok_or_else(|| DispatchError::internal("user loader did not run"))?;
            Ok(format!("<h1>{}</h1><p>id {}</p>", user.name, user.id))
        })
        .name("user")
        .loader(load_user)
        .meta(RouteMeta::new("User"));

    let dashboard = router
        .group("/dashboard")
        .layout("dashboard")
        .middleware(from_fn(|ctx, next| {
            if ctx.headers().contains_key("x-demo-user") {
                next(ctx)
            } else {
                Err(DispatchError::unauthorized("dashboard requires x-demo-user"))
            }
        }));
    let _ = dashboard
        .get("/", |_ctx| Ok("<h2>Overview</h2>"))
        .name("dashboard")
        .meta(RouteMeta::new("Dashboard").no_index());
    let _ = dashboard
        .get("/settings", |_ctx| Ok("<h2>Settings</h2>"))
        .meta(RouteMeta::new("Settings").no_index());

    let _ = router
        .get("/docs/*path", |ctx| {
            Ok(format!("<h1>Docs</h1><p>{}</p>", ctx.param("path").unwrap_or("index")))
        })
        .name("docs");

    let _ = router
        .get("/api/routes", |ctx| {
            ctx.insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(Json(ctx.router().routes()))
        })
        .no_layout();

    tracing::info!(routes = router.routes().len(), "Site registered");
    Ok(())
}
