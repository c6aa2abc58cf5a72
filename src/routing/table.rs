//! Priority-ordered route table.
//!
//! # Responsibilities
//! - Assign ids and keep routes sorted by priority
//! - Look up the first route matching a method and path
//!
//! # Design Decisions
//! - Stable sort after every insertion: equal priorities keep registration order
//! - O(n) scan in priority order; first match wins
//! - The path is split once per lookup and one capture buffer is reused
//!   across candidates

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::Method;

use crate::routing::pattern::{split_path, Params};
use crate::routing::route::{Route, RouteInfo};

/// Stable identifier of a registered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(usize);

impl RouteId {
    pub(crate) const UNASSIGNED: RouteId = RouteId(usize::MAX);
}

#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Arc<Route>>>,
    next_id: AtomicUsize,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, mut route: Route) -> RouteId {
        let id = RouteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        route.id = id;

        tracing::debug!(
            method = %route.method,
            pattern = route.pattern.as_str(),
            priority = route.priority(),
            "Route registered"
        );

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes.push(Arc::new(route));
        routes.sort_by_key(|r| r.priority());
        id
    }

    /// Mutate a registered route in place and drop its composed chain.
    /// Requests already holding the route keep the previous version.
    pub(crate) fn update(&self, id: RouteId, f: impl FnOnce(&mut Route)) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        match routes.iter_mut().find(|r| r.id == id) {
            Some(route) => {
                let route = Arc::make_mut(route);
                f(route);
                route.chain.clear();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: RouteId) -> Option<Arc<Route>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// First route, in priority order, whose method and pattern match.
    pub fn find(&self, method: &Method, path: &str) -> Option<(Arc<Route>, Params)> {
        let segments: Vec<&str> = split_path(path).collect();
        let mut captures = Vec::with_capacity(4);

        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .filter(|r| r.method == *method)
            .find(|r| r.pattern.match_segments(&segments, &mut captures))
            .map(|r| (r.clone(), r.pattern.extract(&segments, &captures)))
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries in match order.
    pub fn infos(&self) -> Vec<RouteInfo> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.info())
            .collect()
    }
}
