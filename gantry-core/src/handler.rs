// Route handler contract

use crate::context::HttpContext;
use crate::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for async route handler functions.
///
/// A handler receives the request context and writes its result into the
/// context's response accumulator; the framework does not constrain what it
/// does beyond that.
pub type HandlerFn = Arc<
    dyn Fn(Arc<HttpContext>) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async closure into a [`HandlerFn`]
///
/// ```ignore
/// let h = handler(|ctx| async move {
///     ctx.with_response(|r| r.send(200, b"hello".to_vec()));
///     Ok(())
/// });
/// ```
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<HttpContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}
