//! Registered routes and their fluent configuration handle.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::http::dispatcher::Router;
use crate::http::error::DispatchError;
use crate::http::loader::{loader, Loader};
use crate::http::middleware::{ChainCache, Handler, Middleware};
use crate::routing::pattern::{Params, Pattern};
use crate::routing::table::RouteId;

/// Page metadata carried to handlers and layouts. The router never renders it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub image: Option<String>,
    pub og_type: Option<String>,
    pub canonical: Option<String>,
    pub no_index: bool,
}

impl RouteMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn og_type(mut self, og_type: impl Into<String>) -> Self {
        self.og_type = Some(og_type.into());
        self
    }

    pub fn canonical(mut self, canonical: impl Into<String>) -> Self {
        self.canonical = Some(canonical.into());
        self
    }

    pub fn no_index(mut self) -> Self {
        self.no_index = true;
        self
    }
}

/// Which layout chain wraps a route's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayoutSelection {
    /// Use the router's default layout, if one is set.
    #[default]
    Default,
    Named(String),
    /// Never wrap, not even in the default layout.
    Skip,
}

#[derive(Clone)]
pub struct Route {
    pub(crate) id: RouteId,
    pub(crate) method: Method,
    pub(crate) pattern: Arc<Pattern>,
    pub(crate) handler: Handler,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) name: Option<String>,
    pub(crate) layout: LayoutSelection,
    pub(crate) loader: Option<Loader>,
    pub(crate) meta: Option<Arc<RouteMeta>>,
    pub(crate) chain: ChainCache,
}

impl Route {
    pub(crate) fn new(
        method: Method,
        pattern: Arc<Pattern>,
        handler: Handler,
        middleware: Vec<Arc<dyn Middleware>>,
        layout: LayoutSelection,
    ) -> Self {
        Self {
            id: RouteId::UNASSIGNED,
            method,
            pattern,
            handler,
            middleware,
            name: None,
            layout,
            loader: None,
            meta: None,
            chain: ChainCache::default(),
        }
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn layout(&self) -> &LayoutSelection {
        &self.layout
    }

    pub fn meta(&self) -> Option<&RouteMeta> {
        self.meta.as_deref()
    }

    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub fn priority(&self) -> u32 {
        self.pattern.priority()
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            method: self.method.to_string(),
            pattern: self.pattern.as_str().to_string(),
            name: self.name.clone(),
            priority: self.priority(),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("name", &self.name)
            .field("middleware", &self.middleware.len())
            .field("layout", &self.layout)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

/// Serializable summary of a route, as listed by `Router::routes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub pattern: String,
    pub name: Option<String>,
    pub priority: u32,
}

/// Returned by every registration call. Configuration applies to all routes
/// created by that call (one per verb).
#[must_use = "a RouteHandle does nothing unless configured or dropped deliberately"]
pub struct RouteHandle {
    router: Router,
    ids: Vec<RouteId>,
}

impl RouteHandle {
    pub(crate) fn new(router: Router, ids: Vec<RouteId>) -> Self {
        Self { router, ids }
    }

    pub fn ids(&self) -> &[RouteId] {
        &self.ids
    }

    /// Register a reverse-lookup name. With several verbs the name points at
    /// the first; they share a pattern so generated URLs are identical.
    pub fn name(self, name: &str) -> Self {
        if let Some(&id) = self.ids.first() {
            self.router.names().insert(name, id);
            self.update(|route| route.name = Some(name.to_string()));
        }
        self
    }

    /// Append middleware that runs inside any group and global middleware.
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.update(|route| route.middleware.push(middleware.clone()));
        self
    }

    pub fn loader<F, Fut, T>(self, f: F) -> Self
    where
        F: Fn(tokio_util::sync::CancellationToken, Params) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, DispatchError>> + Send + 'static,
        T: std::any::Any + Send + Sync,
    {
        let load = loader(f);
        self.update(|route| route.loader = Some(load.clone()));
        self
    }

    pub fn layout(self, name: &str) -> Self {
        self.update(|route| route.layout = LayoutSelection::Named(name.to_string()));
        self
    }

    pub fn no_layout(self) -> Self {
        self.update(|route| route.layout = LayoutSelection::Skip);
        self
    }

    pub fn meta(self, meta: RouteMeta) -> Self {
        let meta = Arc::new(meta);
        self.update(|route| route.meta = Some(meta.clone()));
        self
    }

    fn update(&self, mut f: impl FnMut(&mut Route)) {
        for &id in &self.ids {
            self.router.table().update(id, &mut f);
        }
    }
}
