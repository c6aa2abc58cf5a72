//! Route groups: a shared prefix with inherited middleware and layout.
//!
//! A child group copies its parent's configuration and appends to it; the
//! parent is never changed.

use std::sync::Arc;

use axum::http::Method;

use crate::http::context::RequestContext;
use crate::http::dispatcher::Router;
use crate::http::error::DispatchError;
use crate::http::middleware::{handler, Middleware};
use crate::http::render::Renderable;
use crate::routing::route::{LayoutSelection, RouteHandle};

#[derive(Clone)]
pub struct Group {
    router: Router,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
    layout: LayoutSelection,
}

impl Group {
    pub(crate) fn new(router: Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: join_paths("", prefix),
            middleware: Vec::new(),
            layout: LayoutSelection::Default,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Add middleware applied to every route registered through this group
    /// or its children, after any middleware added earlier.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn layout(mut self, name: &str) -> Self {
        self.layout = LayoutSelection::Named(name.to_string());
        self
    }

    pub fn no_layout(mut self) -> Self {
        self.layout = LayoutSelection::Skip;
        self
    }

    /// Nested group under this one's prefix.
    pub fn group(&self, prefix: &str) -> Group {
        Group {
            router: self.router.clone(),
            prefix: join_paths(&self.prefix, prefix),
            middleware: self.middleware.clone(),
            layout: self.layout.clone(),
        }
    }

    pub fn route<F, R>(&self, methods: &[Method], path: &str, f: F) -> RouteHandle
    where
        F: Fn(&mut RequestContext) -> Result<R, DispatchError> + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        self.router.register(
            methods,
            &join_paths(&self.prefix, path),
            handler(f),
            self.middleware.clone(),
            self.layout.clone(),
        )
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
}

/// Join a prefix and a path into one normalized template.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_matches('/');

    let joined = match (prefix.is_empty(), path.is_empty()) {
        (true, true) => return "/".to_string(),
        (false, true) => prefix.to_string(),
        (true, false) => format!("/{path}"),
        (false, false) => format!("{prefix}/{path}"),
    };

    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::Handler;

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("", "/"), "/");
        assert_eq!(join_paths("/admin", "/"), "/admin");
        assert_eq!(join_paths("/admin/", "users"), "/admin/users");
        assert_eq!(join_paths("admin", "/users/:id/"), "/admin/users/:id");
        assert_eq!(join_paths("/", "/about"), "/about");
    }

    #[test]
    fn test_child_does_not_touch_parent() {
        let router = Router::new();
        let parent = router.group("/admin").layout("admin");
        let child = parent.group("/reports").no_layout().middleware(|next: Handler| next);

        assert_eq!(child.prefix(), "/admin/reports");
        assert_eq!(parent.layout, LayoutSelection::Named("admin".into()));
        assert!(parent.middleware.is_empty());
        assert_eq!(child.middleware.len(), 1);
    }

    #[test]
    fn test_group_routes_carry_prefix_and_layout() {
        let router = Router::new();
        let group = router.group("/dashboard").layout("dash");
        let _ = group.get("/", |_ctx| Ok("index"));
        let _ = group.get("/stats", |_ctx| Ok("stats"));

        let patterns: Vec<_> = router.routes().into_iter().map(|r| r.pattern).collect();
        assert!(patterns.contains(&"/dashboard".to_string()));
        assert!(patterns.contains(&"/dashboard/stats".to_string()));

        let (route, _) = router.table().find(&Method::GET, "/dashboard/stats").unwrap();
        assert_eq!(route.layout(), &LayoutSelection::Named("dash".into()));
    }
}
