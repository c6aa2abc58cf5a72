/// Verb shorthands over a `route(&self, &[Method], path, handler)` method.
macro_rules! verb_methods {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Register a `", stringify!($method), "` route.")]
            pub fn $name<F, R>(&self, path: &str, handler: F) -> $crate::routing::RouteHandle
            where
                F: Fn(
                        &mut $crate::http::context::RequestContext,
                    ) -> Result<R, $crate::http::error::DispatchError>
                    + Send
                    + Sync
                    + 'static,
                R: $crate::http::render::Renderable + 'static,
            {
                self.route(&[::axum::http::Method::$method], path, handler)
            }
        )*
    };
}
