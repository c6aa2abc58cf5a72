//! The request dispatcher.
//!
//! # Data Flow
//! ```text
//! Request<Bytes>
//!     → RouteTable::find (method, path)          miss → not-found handler
//!     → RequestContext (params, route metadata)
//!     → loader (optional, bounded)               failure → status page
//!     → global middleware → route middleware → handler
//!                                                failure → error handler
//!     → layout chain (route, group or default)
//!     → render into buffer, then status + headers + body
//! ```
//!
//! # Design Decisions
//! - `Router` is an explicit, cheaply cloned handle; independent instances
//!   never share state
//! - Registries are read-mostly and sit behind their own locks; nothing is
//!   held across the loader await
//! - Output is fully buffered so a render failure can still become a 500

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::config::schema::RouterSettings;
use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::error_pages::{error_handler, ErrorHandler, ErrorPages};
use crate::http::layout::{self, LayoutError, LayoutRegistry};
use crate::http::loader::{LoaderExecutor, DEFAULT_LOADER_TIMEOUT};
use crate::http::middleware::{compose, handler, ChainCache, Handler, Middleware};
use crate::http::render::{BoxRenderable, Renderable};
use crate::observability::metrics;
use crate::routing::named::{generate, generate_with};
use crate::routing::{
    join_paths, Group, LayoutSelection, NamedRoutes, Params, Pattern, Route, RouteHandle, RouteInfo,
    RouteTable, UrlError,
};

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Every verb `Router::any` registers.
const ALL_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
    Method::HEAD,
];

#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    base_path: String,
    routes: RouteTable,
    names: NamedRoutes,
    layouts: LayoutRegistry,
    error_pages: ErrorPages,
    middleware: RwLock<MiddlewareStack>,
    default_layout: RwLock<Option<String>>,
    not_found: Handler,
    not_found_chain: ChainCache,
    error_handler: Option<ErrorHandler>,
    loaders: LoaderExecutor,
}

/// Global middleware. `generation` moves on every push so cached route
/// chains know to rebuild.
#[derive(Default)]
struct MiddlewareStack {
    layers: Vec<Arc<dyn Middleware>>,
    generation: u64,
}

/// Construction-time options for a [`Router`].
pub struct RouterBuilder {
    base_path: String,
    not_found: Option<Handler>,
    error_handler: Option<ErrorHandler>,
    default_layout: Option<String>,
    loader_timeout: Duration,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            not_found: None,
            error_handler: None,
            default_layout: None,
            loader_timeout: DEFAULT_LOADER_TIMEOUT,
        }
    }
}

impl RouterBuilder {
    /// Prefix prepended to every registered pattern.
    pub fn base_path(mut self, base_path: &str) -> Self {
        let joined = join_paths("", base_path);
        self.base_path = if joined == "/" { String::new() } else { joined };
        self
    }

    /// Replace the handler invoked when no route matches. The response
    /// status starts at 404; the handler may change it.
    pub fn not_found<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.not_found = Some(handler(f));
        self
    }

    /// Render every handler failure through `f` instead of the status pages.
    pub fn error_handler<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestContext, &DispatchError) -> R + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.error_handler = Some(error_handler(f));
        self
    }

    pub fn default_layout(mut self, name: &str) -> Self {
        self.default_layout = Some(name.to_string());
        self
    }

    pub fn loader_timeout(mut self, timeout: Duration) -> Self {
        self.loader_timeout = timeout;
        self
    }

    pub fn build(self) -> Router {
        let not_found = self.not_found.unwrap_or_else(|| {
            handler(|ctx| {
                Err::<&'static str, _>(DispatchError::not_found(format!(
                    "no route for {}",
                    ctx.path()
                )))
            })
        });

        Router {
            inner: Arc::new(RouterInner {
                base_path: self.base_path,
                routes: RouteTable::new(),
                names: NamedRoutes::new(),
                layouts: LayoutRegistry::new(),
                error_pages: ErrorPages::new(),
                middleware: RwLock::new(MiddlewareStack::default()),
                default_layout: RwLock::new(self.default_layout),
                not_found,
                not_found_chain: ChainCache::default(),
                error_handler: self.error_handler,
                loaders: LoaderExecutor::new(self.loader_timeout),
            }),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        RouterBuilder::default().build()
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn from_config(settings: &RouterSettings) -> Self {
        let mut builder = Self::builder()
            .base_path(&settings.base_path)
            .loader_timeout(Duration::from_millis(settings.loader_timeout_ms));
        if let Some(layout) = &settings.default_layout {
            builder = builder.default_layout(layout);
        }
        builder.build()
    }

    pub fn base_path(&self) -> &str {
        &self.inner.base_path
    }

    pub fn loader_timeout(&self) -> Duration {
        self.inner.loaders.budget()
    }

    /// Add middleware that wraps every route, outside any route middleware.
    pub fn middleware<M: Middleware>(&self, middleware: M) -> &Self {
        let mut stack = self
            .inner
            .middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        stack.layers.push(Arc::new(middleware));
        stack.generation += 1;
        self
    }

    pub fn group(&self, prefix: &str) -> Group {
        Group::new(self.clone(), prefix)
    }

    pub fn register_layout<F, R>(
        &self,
        name: &str,
        parent: Option<&str>,
        render: F,
    ) -> Result<(), LayoutError>
    where
        F: Fn(&RequestContext, BoxRenderable) -> R + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.inner.layouts.register(name, parent, render)
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.inner.layouts
    }

    pub fn set_default_layout(&self, name: Option<&str>) {
        *self
            .inner
            .default_layout
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.map(str::to_string);
    }

    /// Register a custom page for `status`.
    pub fn error_page<F, R>(&self, status: StatusCode, page: F)
    where
        F: Fn(&mut RequestContext, &DispatchError) -> R + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.inner.error_pages.register(status, page);
    }

    pub fn error_pages(&self) -> &ErrorPages {
        &self.inner.error_pages
    }

    /// Register `f` for each verb in `methods`.
    pub fn route<F, R>(&self, methods: &[Method], path: &str, f: F) -> RouteHandle
    where
        F: Fn(&mut RequestContext) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.register(methods, path, handler(f), Vec::new(), LayoutSelection::Default)
    }

    /// Register `f` for every common verb.
    pub fn any<F, R>(&self, path: &str, f: F) -> RouteHandle
    where
        F: Fn(&mut RequestContext) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.route(&ALL_METHODS, path, f)
    }

    verb_methods! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        options => OPTIONS,
        head => HEAD,
    }

    /// # Panics
    /// When `path` is not a valid pattern. Routes are registered at startup,
    /// so a bad template is a programming error.
    pub(crate) fn register(
        &self,
        methods: &[Method],
        path: &str,
        handler: Handler,
        middleware: Vec<Arc<dyn Middleware>>,
        layout: LayoutSelection,
    ) -> RouteHandle {
        let template = join_paths(&self.inner.base_path, path);
        let pattern = match Pattern::parse(&template) {
            Ok(pattern) => Arc::new(pattern),
            Err(err) => panic!("invalid route pattern `{template}`: {err}"),
        };

        let ids = methods
            .iter()
            .map(|method| {
                self.inner.routes.insert(Route::new(
                    method.clone(),
                    pattern.clone(),
                    handler.clone(),
                    middleware.clone(),
                    layout.clone(),
                ))
            })
            .collect();

        RouteHandle::new(self.clone(), ids)
    }

    /// Build the path of a named route from positional arguments.
    pub fn url<I>(&self, name: &str, args: I) -> Result<String, UrlError>
    where
        I: IntoIterator,
        I::Item: std::fmt::Display,
    {
        let route = self.named(name)?;
        generate(route.pattern(), name, args)
    }

    /// Build the path of a named route from `(parameter, value)` pairs.
    pub fn url_with<I, K, V>(&self, name: &str, pairs: I) -> Result<String, UrlError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: std::fmt::Display,
    {
        let route = self.named(name)?;
        generate_with(route.pattern(), name, pairs)
    }

    fn named(&self, name: &str) -> Result<Arc<Route>, UrlError> {
        self.inner
            .names
            .get(name)
            .and_then(|id| self.inner.routes.get(id))
            .ok_or_else(|| UrlError::UnknownRoute(name.to_string()))
    }

    /// Registered routes in match order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.inner.routes.infos()
    }

    pub(crate) fn table(&self) -> &RouteTable {
        &self.inner.routes
    }

    pub(crate) fn names(&self) -> &NamedRoutes {
        &self.inner.names
    }

    /// Dispatch with a token nobody cancels.
    pub async fn handle(&self, request: Request<Bytes>) -> Response {
        self.dispatch(request, CancellationToken::new()).await
    }

    /// Run one request through the pipeline. Never fails: every outcome is
    /// a response with an explicit status and body.
    pub async fn dispatch(&self, request: Request<Bytes>, cancel: CancellationToken) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();

        let (route, params) = match self.inner.routes.find(&parts.method, parts.uri.path()) {
            Some((route, params)) => (Some(route), params),
            None => (None, Params::default()),
        };

        let mut ctx = RequestContext::new(self.clone(), parts, body, params, route.clone());

        let output = match route {
            Some(route) => self.run_route(&route, &mut ctx, &cancel).await,
            None => self.run_not_found(&mut ctx),
        };

        self.finish(ctx, output, start)
    }

    async fn run_route(
        &self,
        route: &Route,
        ctx: &mut RequestContext,
        cancel: &CancellationToken,
    ) -> BoxRenderable {
        if let Some(loader) = &route.loader {
            match self.inner.loaders.run(loader, cancel, ctx.params().clone()).await {
                Ok(data) => ctx.attach_data(data),
                Err(err) => {
                    if err.is_timeout() {
                        tracing::warn!(
                            route = route.pattern().as_str(),
                            budget_ms = self.inner.loaders.budget().as_millis() as u64,
                            "Loader timed out"
                        );
                        metrics::record_loader_timeout(route.pattern().as_str());
                    }
                    return self.status_page(ctx, &err);
                }
            }
        }

        let chain = self.chain(&route.chain, &route.handler, &route.middleware);
        match chain(ctx) {
            Ok(output) => self.apply_layout(route.layout(), ctx, output),
            Err(err) => self.render_error(ctx, &err),
        }
    }

    fn run_not_found(&self, ctx: &mut RequestContext) -> BoxRenderable {
        ctx.set_status(StatusCode::NOT_FOUND);
        let chain = self.chain(&self.inner.not_found_chain, &self.inner.not_found, &[]);
        match chain(ctx) {
            Ok(output) => self.apply_layout(&LayoutSelection::Default, ctx, output),
            Err(err) => self.render_error(ctx, &err),
        }
    }

    /// Global middleware outermost, then the route's own. Composed once per
    /// global generation and cached on the route.
    fn chain(
        &self,
        cache: &ChainCache,
        handler: &Handler,
        route_middleware: &[Arc<dyn Middleware>],
    ) -> Handler {
        let global = self
            .inner
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        cache.get_or_compose(global.generation, || {
            compose(handler.clone(), global.layers.iter().chain(route_middleware))
        })
    }

    fn apply_layout(
        &self,
        selection: &LayoutSelection,
        ctx: &mut RequestContext,
        output: BoxRenderable,
    ) -> BoxRenderable {
        let name = match selection {
            LayoutSelection::Skip => return output,
            LayoutSelection::Named(name) => Some(name.clone()),
            LayoutSelection::Default => self
                .inner
                .default_layout
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        let Some(name) = name else {
            return output;
        };

        match self.inner.layouts.resolve(&name) {
            Ok(chain) => layout::compose(&chain, ctx, output),
            Err(err) => self.status_page(ctx, &DispatchError::internal(err)),
        }
    }

    fn render_error(&self, ctx: &mut RequestContext, err: &DispatchError) -> BoxRenderable {
        match &self.inner.error_handler {
            Some(custom) => {
                log_failure(ctx, err);
                ctx.reset_response(err.status());
                custom(ctx, err)
            }
            None => self.status_page(ctx, err),
        }
    }

    fn status_page(&self, ctx: &mut RequestContext, err: &DispatchError) -> BoxRenderable {
        log_failure(ctx, err);
        self.inner.error_pages.render(ctx, err)
    }

    fn finish(&self, mut ctx: RequestContext, output: BoxRenderable, start: Instant) -> Response {
        let mut buffer = Vec::with_capacity(4096);
        if let Err(err) = output.render(&mut buffer) {
            buffer.clear();
            let page = self.status_page(&mut ctx, &DispatchError::internal(err));
            if page.render(&mut buffer).is_err() {
                buffer.clear();
                buffer.extend_from_slice(b"500 Internal Server Error\n");
            }
        }

        let method = ctx.method().clone();
        let route = ctx.pattern().unwrap_or("unmatched").to_string();
        let (status, mut headers) = ctx.into_response_head();
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        let elapsed = start.elapsed();
        metrics::record_request(&method, &route, status, elapsed);
        tracing::debug!(
            method = %method,
            route = %route,
            status = status.as_u16(),
            bytes = buffer.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Request dispatched"
        );

        let mut response = Response::new(Body::from(buffer));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn log_failure(ctx: &RequestContext, err: &DispatchError) {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(
            method = %ctx.method(),
            path = %ctx.path(),
            status = status.as_u16(),
            error = %err,
            "Request failed"
        );
    } else {
        tracing::debug!(
            method = %ctx.method(),
            path = %ctx.path(),
            status = status.as_u16(),
            error = %err,
            "Request rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn request(method: Method, path: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_default_content_type_and_status() {
        let router = Router::new();
        let _ = router.get("/", |_ctx| Ok("home"));

        let response = router.handle(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert_eq!(body_string(response).await, "home");
    }

    #[tokio::test]
    async fn test_default_not_found_uses_status_page() {
        let router = Router::new();
        let response = router.handle(request(Method::GET, "/nowhere")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn test_custom_not_found_starts_at_404() {
        let router = Router::builder()
            .not_found(|ctx| Ok(format!("missing {}", ctx.path())))
            .build();

        let response = router.handle(request(Method::GET, "/x")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "missing /x");
    }

    #[tokio::test]
    async fn test_base_path_prefixes_routes_and_urls() {
        let router = Router::builder().base_path("/app/").build();
        let _ = router
            .get("/users/:id", |ctx| Ok(ctx.param("id").unwrap_or("").to_string()))
            .name("user");

        assert_eq!(router.url("user", [5]).unwrap(), "/app/users/5");
        let response = router.handle(request(Method::GET, "/app/users/5")).await;
        assert_eq!(body_string(response).await, "5");

        let response = router.handle(request(Method::GET, "/users/5")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_render_failure_becomes_500() {
        struct Broken;
        impl Renderable for Broken {
            fn render(&self, _out: &mut dyn std::io::Write) -> std::io::Result<()> {
                Err(std::io::Error::other("template blew up"))
            }
        }

        let router = Router::new();
        let _ = router.get("/", |_ctx| Ok(Broken));

        let response = router.handle(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_unknown_layout_renders_500() {
        let router = Router::new();
        let _ = router.get("/", |_ctx| Ok("body")).layout("missing");

        let response = router.handle(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_chain_is_composed_once_per_generation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(Arc<AtomicUsize>);
        impl Middleware for Counting {
            fn wrap(&self, next: Handler) -> Handler {
                self.0.fetch_add(1, Ordering::SeqCst);
                next
            }
        }

        let wraps = Arc::new(AtomicUsize::new(0));
        let router = Router::new();
        router.middleware(Counting(wraps.clone()));
        let _ = router.get("/", |_ctx| Ok("home"));

        for _ in 0..3 {
            let _ = router.handle(request(Method::GET, "/")).await;
        }
        assert_eq!(wraps.load(Ordering::SeqCst), 1);

        router.middleware(|next: Handler| next);
        let _ = router.handle(request(Method::GET, "/")).await;
        let _ = router.handle(request(Method::GET, "/")).await;
        assert_eq!(wraps.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "invalid route pattern")]
    fn test_invalid_pattern_panics() {
        let router = Router::new();
        let _ = router.get("/users/:id/:id", |_ctx| Ok("dup"));
    }

    #[test]
    fn test_any_registers_every_verb() {
        let router = Router::new();
        let handle = router.any("/echo", |_ctx| Ok("echo"));
        assert_eq!(handle.ids().len(), ALL_METHODS.len());
        assert_eq!(router.routes().len(), ALL_METHODS.len());
    }
}
