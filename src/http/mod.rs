//! HTTP dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request ID, trace, timeout, body limit)
//!     → dispatcher.rs (route lookup, loader, middleware, handler, layout)
//!     → error_pages.rs (on failure)
//!     → buffered response back to the client
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod error_pages;
pub mod layout;
pub mod loader;
pub mod middleware;
pub mod render;
pub mod request;
pub mod server;

pub use context::RequestContext;
pub use dispatcher::{Router, RouterBuilder};
pub use error::{BoxError, DispatchError};
pub use error_pages::ErrorPages;
pub use layout::{Layout, LayoutError, LayoutRegistry};
pub use loader::{loader, Loader, LoaderExecutor};
pub use middleware::{from_fn, handler, log_requests, recover, Handler, HandlerResult, Middleware};
pub use render::{render_fn, BoxRenderable, Json, Renderable};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
