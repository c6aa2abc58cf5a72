//! Page router: an HTTP request dispatcher for server-rendered sites.
//!
//! Routes are matched by specificity, wrapped in composable middleware,
//! optionally preceded by a timeout-bound data loader, and their output is
//! wrapped in nested layouts. Failures are rendered through status-coded
//! error pages.

#[macro_use]
mod macros;

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::RouterConfig;
pub use http::{
    render_fn, DispatchError, HttpServer, Json, Middleware, RequestContext, Renderable, Router,
    RouterBuilder,
};
pub use lifecycle::Shutdown;
pub use routing::{Params, RouteMeta, UrlError};
