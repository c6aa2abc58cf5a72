//! Per-request state.
//!
//! A `RequestContext` is created when dispatch starts and dropped once the
//! response is built. It carries the matched parameters, a typed key/value
//! bag for middleware, the loader output, the route metadata and the
//! response head under construction.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::{HeaderName, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};

use crate::http::dispatcher::Router;
use crate::http::error::DispatchError;
use crate::http::loader::LoadedData;
use crate::http::request::X_REQUEST_ID;
use crate::routing::{Params, Route, RouteMeta};

pub struct RequestContext {
    router: Router,
    request: Parts,
    body: Bytes,
    params: Params,
    route: Option<Arc<Route>>,
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
    data: Option<LoadedData>,
    status: StatusCode,
    headers: HeaderMap,
}

impl RequestContext {
    pub(crate) fn new(
        router: Router,
        request: Parts,
        body: Bytes,
        params: Params,
        route: Option<Arc<Route>>,
    ) -> Self {
        Self {
            router,
            request,
            body,
            params,
            route,
            values: HashMap::new(),
            data: None,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    /// The router that dispatched this request.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.request.uri.query()
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Metadata of the matched route, if any.
    pub fn meta(&self) -> Option<&RouteMeta> {
        self.route.as_ref().and_then(|r| r.meta())
    }

    /// Template of the matched route, `None` when nothing matched.
    pub fn pattern(&self) -> Option<&str> {
        self.route.as_ref().map(|r| r.pattern().as_str())
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route.as_ref().and_then(|r| r.name())
    }

    /// Store a value for later middleware, handlers or layouts.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Output of the route's loader, if it ran and produced a `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn attach_data(&mut self, data: LoadedData) {
        if self.data.is_some() {
            tracing::warn!(
                path = %self.path(),
                "Loader data already attached, ignoring second value"
            );
            return;
        }
        self.data = Some(data);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Headers that will be sent with the response.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Turn the response into a `302 Found` pointing at `location`.
    pub fn redirect(&mut self, location: &str) -> Result<(), DispatchError> {
        let value = HeaderValue::try_from(location).map_err(DispatchError::internal)?;
        self.status = StatusCode::FOUND;
        self.headers.insert(LOCATION, value);
        Ok(())
    }

    /// Drop everything the handler put on the response head and start over
    /// with `status`. Error pages render from here.
    pub(crate) fn reset_response(&mut self, status: StatusCode) {
        self.status = status;
        self.headers.clear();
    }

    pub(crate) fn into_response_head(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

#[cfg(test)]
pub(crate) fn test_context(router: &Router, path: &str) -> RequestContext {
    let (parts, ()) = axum::http::Request::builder()
        .uri(path)
        .body(())
        .unwrap()
        .into_parts();
    RequestContext::new(router.clone(), parts, Bytes::new(), Params::default(), None)
}
