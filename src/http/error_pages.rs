//! Status-coded error pages.
//!
//! # Responsibilities
//! - Hold custom pages registered per status code
//! - Fall back to built-in plain-text copy when none is registered
//! - Set the response status before anything is rendered, discarding
//!   headers the failed handler left behind

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};

use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::render::{BoxRenderable, Renderable};

/// Produces the body for a failed request.
pub type ErrorHandler =
    Arc<dyn Fn(&mut RequestContext, &DispatchError) -> BoxRenderable + Send + Sync>;

pub(crate) fn error_handler<F, R>(f: F) -> ErrorHandler
where
    F: Fn(&mut RequestContext, &DispatchError) -> R + Send + Sync + 'static,
    R: Renderable + 'static,
{
    Arc::new(move |ctx: &mut RequestContext, err: &DispatchError| {
        Box::new(f(ctx, err)) as BoxRenderable
    })
}

#[derive(Default)]
pub struct ErrorPages {
    pages: RwLock<HashMap<StatusCode, ErrorHandler>>,
}

impl ErrorPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom page for `status`, replacing any earlier one.
    pub fn register<F, R>(&self, status: StatusCode, page: F)
    where
        F: Fn(&mut RequestContext, &DispatchError) -> R + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        tracing::debug!(status = status.as_u16(), "Error page registered");
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status, error_handler(page));
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&status)
    }

    /// Render the page for `err`, custom when registered.
    pub fn render(&self, ctx: &mut RequestContext, err: &DispatchError) -> BoxRenderable {
        let status = err.status();
        ctx.reset_response(status);

        let page = self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .cloned();

        match page {
            Some(page) => page(ctx, err),
            None => default_page(ctx, status),
        }
    }
}

/// Title and message of the built-in page for `status`.
pub fn default_copy(status: StatusCode) -> (&'static str, &'static str) {
    match status {
        StatusCode::NOT_FOUND => ("Page Not Found", "The page you are looking for does not exist."),
        StatusCode::FORBIDDEN => ("Forbidden", "You do not have permission to access this page."),
        StatusCode::UNAUTHORIZED => ("Unauthorized", "You need to sign in to access this page."),
        StatusCode::INTERNAL_SERVER_ERROR => (
            "Internal Server Error",
            "Something went wrong on our end. Please try again later.",
        ),
        StatusCode::REQUEST_TIMEOUT => (
            "Request Timeout",
            "The request took too long to complete.",
        ),
        other => (
            other.canonical_reason().unwrap_or("Error"),
            "An unexpected error occurred.",
        ),
    }
}

fn default_page(ctx: &mut RequestContext, status: StatusCode) -> BoxRenderable {
    let (title, message) = default_copy(status);
    ctx.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    Box::new(format!("{} {}\n\n{}\n", status.as_u16(), title, message))
}
