//! Job handlers

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Error type handlers may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<Value, BoxError>;

/// Executes jobs of one name.
///
/// The returned value is stored as the job's `result`; an error fails the
/// job and may schedule a retry.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, params: Value) -> HandlerResult;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn execute(&self, params: Value) -> HandlerResult {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
