//! Handler and middleware composition.
//!
//! # Nesting
//! ```text
//! global[0] → global[1] → … → route[0] → route[1] → … → handler
//! ```
//! For `[A, B]` around `H` the call trace is
//! `A-before, B-before, H, B-after, A-after`.
//!
//! # Design Decisions
//! - A middleware is just `Handler -> Handler`; closures qualify directly
//! - Composition folds from the innermost layer outwards (reverse order)
//! - A route's chain is composed on its first request and kept until the
//!   global stack or the route's own middleware changes

mod logging;
mod recover;

use std::sync::{Arc, PoisonError, RwLock};

use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::render::{BoxRenderable, Renderable};

pub use logging::log_requests;
pub use recover::recover;

pub type HandlerResult = Result<BoxRenderable, DispatchError>;

/// A type-erased request handler.
pub type Handler = Arc<dyn Fn(&mut RequestContext) -> HandlerResult + Send + Sync>;

/// Erase a handler returning any `Renderable`.
pub fn handler<F, R>(f: F) -> Handler
where
    F: Fn(&mut RequestContext) -> Result<R, DispatchError> + Send + Sync + 'static,
    R: Renderable + 'static,
{
    Arc::new(move |ctx: &mut RequestContext| f(ctx).map(|r| Box::new(r) as BoxRenderable))
}

/// Wraps a handler into another handler.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Build a middleware from a function that receives the request and the
/// next handler in the chain.
pub fn from_fn<F>(f: F) -> impl Middleware
where
    F: Fn(&mut RequestContext, &Handler) -> HandlerResult + Send + Sync + 'static,
{
    let f = Arc::new(f);
    move |next: Handler| -> Handler {
        let f = f.clone();
        Arc::new(move |ctx: &mut RequestContext| f(ctx, &next))
    }
}

/// Wrap `handler` so that the first middleware ends up outermost.
pub fn compose<'a, I>(handler: Handler, middleware: I) -> Handler
where
    I: IntoIterator<Item = &'a Arc<dyn Middleware>>,
    I::IntoIter: DoubleEndedIterator,
{
    middleware
        .into_iter()
        .rev()
        .fold(handler, |next, layer| layer.wrap(next))
}

/// A composed chain tagged with the global middleware generation it was
/// built from. Clones start empty.
#[derive(Default)]
pub(crate) struct ChainCache(RwLock<Option<(u64, Handler)>>);

impl ChainCache {
    pub(crate) fn get_or_compose(
        &self,
        generation: u64,
        build: impl FnOnce() -> Handler,
    ) -> Handler {
        if let Some((built, chain)) = &*self.0.read().unwrap_or_else(PoisonError::into_inner) {
            if *built == generation {
                return chain.clone();
            }
        }

        let chain = build();
        *self.0.write().unwrap_or_else(PoisonError::into_inner) =
            Some((generation, chain.clone()));
        chain
    }

    pub(crate) fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Clone for ChainCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::test_context;
    use crate::http::dispatcher::Router;
    use crate::http::render::render_to_vec;
    use std::sync::Mutex;

    fn tracing_layer(name: &'static str, trace: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(from_fn(move |ctx, next| {
            trace.lock().unwrap().push(format!("{name}-before"));
            let result = next(ctx);
            trace.lock().unwrap().push(format!("{name}-after"));
            result
        }))
    }

    #[test]
    fn test_onion_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let inner = trace.clone();
        let h = handler(move |_ctx| {
            inner.lock().unwrap().push("handler".to_string());
            Ok("done")
        });

        let layers = vec![
            tracing_layer("A", trace.clone()),
            tracing_layer("B", trace.clone()),
        ];
        let composed = compose(h, &layers);

        let router = Router::new();
        let mut ctx = test_context(&router, "/");
        let out = composed(&mut ctx).unwrap();

        assert_eq!(render_to_vec(&out).unwrap(), b"done");
        assert_eq!(
            *trace.lock().unwrap(),
            ["A-before", "B-before", "handler", "B-after", "A-after"]
        );
    }

    #[test]
    fn test_short_circuit() {
        let deny: Arc<dyn Middleware> = Arc::new(from_fn(|_ctx, _next| {
            Err(DispatchError::forbidden("denied"))
        }));
        let composed = compose(handler(|_ctx| Ok("unreachable")), [&deny]);

        let router = Router::new();
        let mut ctx = test_context(&router, "/");
        let err = composed(&mut ctx).err().unwrap();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_chain_cache_rebuilds_on_new_generation() {
        let cache = ChainCache::default();
        let mut builds = 0;

        for generation in [0, 0, 1, 1] {
            let _ = cache.get_or_compose(generation, || {
                builds += 1;
                handler(|_ctx| Ok("x"))
            });
        }
        assert_eq!(builds, 2);

        cache.clear();
        let _ = cache.get_or_compose(1, || {
            builds += 1;
            handler(|_ctx| Ok("x"))
        });
        assert_eq!(builds, 3);
    }

    #[test]
    fn test_plain_closure_middleware() {
        let upper: Arc<dyn Middleware> = Arc::new(|next: Handler| -> Handler {
            Arc::new(move |ctx: &mut RequestContext| {
                ctx.set("wrapped", true);
                next(ctx)
            })
        });
        let composed = compose(
            handler(|ctx| Ok(format!("wrapped={}", ctx.get::<bool>("wrapped").is_some()))),
            [&upper],
        );

        let router = Router::new();
        let mut ctx = test_context(&router, "/");
        let out = composed(&mut ctx).unwrap();
        assert_eq!(render_to_vec(&out).unwrap(), b"wrapped=true");
    }
}
