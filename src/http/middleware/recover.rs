//! Panic recovery.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use axum::http::StatusCode;

use super::{from_fn, Middleware};
use crate::http::error::DispatchError;

/// Convert a panic in any inner handler into a structured 500.
pub fn recover() -> impl Middleware {
    from_fn(|ctx, next| {
        match panic::catch_unwind(AssertUnwindSafe(|| next(ctx))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    panic = %message,
                    "Handler panicked"
                );
                Err(DispatchError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("handler panicked: {message}"),
                ))
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::test_context;
    use crate::http::dispatcher::Router;
    use crate::http::middleware::{compose, handler};
    use std::sync::Arc;

    #[test]
    fn test_panic_becomes_500() {
        let layer: Arc<dyn Middleware> = Arc::new(recover());
        let composed = compose(
            handler(|_ctx| -> Result<&'static str, DispatchError> { panic!("kaboom") }),
            [&layer],
        );

        let router = Router::new();
        let mut ctx = test_context(&router, "/boom");
        let err = composed(&mut ctx).err().unwrap();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn test_success_passes_through() {
        let layer: Arc<dyn Middleware> = Arc::new(recover());
        let composed = compose(handler(|_ctx| Ok("fine")), [&layer]);

        let router = Router::new();
        let mut ctx = test_context(&router, "/");
        assert!(composed(&mut ctx).is_ok());
    }
}
