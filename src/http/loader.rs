//! Timeout-bound data loaders.
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → spawn loader task (child CancellationToken, params)
//!     → race: oneshot result | budget elapsed | request cancelled
//!     → Ok(data) attached to RequestContext, or DispatchError
//! ```
//!
//! # Design Decisions
//! - The result travels over a oneshot channel, so the loader task never
//!   blocks delivering it even when nobody is listening any more
//! - On timeout the loader's token is cancelled and its task aborted; a
//!   loader is expected to watch its token around long waits
//! - Timeout is reported as `DispatchError::Timeout` (408)

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::http::error::DispatchError;
use crate::routing::Params;

/// Budget applied when none is configured.
pub const DEFAULT_LOADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Value produced by a loader, read back through `RequestContext::data`.
pub type LoadedData = Arc<dyn Any + Send + Sync>;

pub type LoaderFuture = BoxFuture<'static, Result<LoadedData, DispatchError>>;

/// Type-erased loader stored on a route.
pub type Loader = Arc<dyn Fn(CancellationToken, Params) -> LoaderFuture + Send + Sync>;

/// Erase a typed async loader.
pub fn loader<F, Fut, T>(f: F) -> Loader
where
    F: Fn(CancellationToken, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, DispatchError>> + Send + 'static,
    T: Any + Send + Sync,
{
    Arc::new(move |cancel: CancellationToken, params: Params| -> LoaderFuture {
        let future = f(cancel, params);
        Box::pin(async move { future.await.map(|data| Arc::new(data) as LoadedData) })
    })
}

/// Runs loaders against a fixed wall-clock budget.
#[derive(Debug, Clone, Copy)]
pub struct LoaderExecutor {
    budget: Duration,
}

impl LoaderExecutor {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `loader` on its own task. `request` is the inbound request's
    /// token; the loader receives a child of it.
    pub async fn run(
        &self,
        loader: &Loader,
        request: &CancellationToken,
        params: Params,
    ) -> Result<LoadedData, DispatchError> {
        let token = request.child_token();
        let (tx, rx) = oneshot::channel();
        let future = loader(token.clone(), params);
        let task = tokio::spawn(async move {
            let _ = tx.send(future.await);
        });

        tokio::select! {
            result = rx => result.unwrap_or_else(|_| {
                Err(DispatchError::internal("loader task ended without producing a result"))
            }),
            _ = tokio::time::sleep(self.budget) => {
                token.cancel();
                task.abort();
                Err(DispatchError::Timeout(self.budget))
            }
            _ = request.cancelled() => {
                token.cancel();
                task.abort();
                Err(DispatchError::new(
                    StatusCode::REQUEST_TIMEOUT,
                    "request cancelled before the loader finished",
                ))
            }
        }
    }
}

impl Default for LoaderExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_LOADER_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_loader_result_is_returned() {
        let executor = LoaderExecutor::new(Duration::from_secs(1));
        let load = loader(|_cancel, params: Params| async move {
            Ok::<_, DispatchError>(format!("user {}", params.get("id").unwrap_or("?")))
        });
        let params: Params = [("id".to_string(), "42".to_string())].into_iter().collect();

        let data = executor.run(&load, &CancellationToken::new(), params).await.unwrap();
        assert_eq!(data.downcast_ref::<String>().unwrap(), "user 42");
    }

    #[tokio::test]
    async fn test_loader_failure_passes_through() {
        let executor = LoaderExecutor::default();
        let load = loader(|_cancel, _params| async move {
            Err::<(), _>(DispatchError::not_found("no such user"))
        });

        let err = executor
            .run(&load, &CancellationToken::new(), Params::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_timeout_returns_promptly_and_stops_loader() {
        let executor = LoaderExecutor::new(Duration::from_millis(50));
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let load = loader(move |_cancel, _params| {
            let guard = SetOnDrop(flag.clone());
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, DispatchError>(())
            }
        });

        let start = Instant::now();
        let err = executor
            .run(&load, &CancellationToken::new(), Params::default())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dropped.load(Ordering::SeqCst), "aborted loader should be dropped");
    }

    #[tokio::test]
    async fn test_loader_sees_cancellation() {
        let executor = LoaderExecutor::new(Duration::from_millis(30));
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let load = loader(move |cancel: CancellationToken, _params| {
            let flag = flag.clone();
            async move {
                let watcher = cancel.clone();
                tokio::spawn(async move {
                    watcher.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, DispatchError>(())
            }
        });

        let err = executor
            .run(&load, &CancellationToken::new(), Params::default())
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_request_cancellation_short_circuits() {
        let executor = LoaderExecutor::new(Duration::from_secs(30));
        let request = CancellationToken::new();
        let load = loader(|_cancel, _params| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, DispatchError>(())
        });

        let trigger = request.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor.run(&load, &request, Params::default()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_panicking_loader_is_internal_error() {
        let executor = LoaderExecutor::new(Duration::from_secs(1));
        let load = loader(|_cancel, _params| async move {
            if true {
                panic!("loader exploded");
            }
            Ok::<_, DispatchError>(())
        });

        let err = executor
            .run(&load, &CancellationToken::new(), Params::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
