//! Request logging middleware.

use std::time::Instant;

use super::{from_fn, Middleware};

/// Emit one `tracing` event per handled request with its latency.
pub fn log_requests() -> impl Middleware {
    from_fn(|ctx, next| {
        let start = Instant::now();
        let result = next(ctx);
        let elapsed_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(_) => tracing::info!(
                request_id = ctx.request_id().unwrap_or("-"),
                method = %ctx.method(),
                path = %ctx.path(),
                route = ctx.pattern().unwrap_or("-"),
                status = ctx.status().as_u16(),
                elapsed_us,
                "Request handled"
            ),
            Err(err) => tracing::info!(
                request_id = ctx.request_id().unwrap_or("-"),
                method = %ctx.method(),
                path = %ctx.path(),
                route = ctx.pattern().unwrap_or("-"),
                status = err.status().as_u16(),
                error = %err,
                elapsed_us,
                "Request failed"
            ),
        }
        result
    })
}
