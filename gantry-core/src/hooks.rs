//! Global before/after hooks.
//!
//! Hooks are not tied to any route; they run around every request. Before
//! hooks run in registration order and may short-circuit the rest of the
//! pipeline by writing a terminal response. After hooks always run, even
//! when the pipeline short-circuited or raised, so cleanup stays symmetric.

use crate::context::HttpContext;
use crate::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Type alias for hook callbacks
pub type HookFn = Arc<
    dyn Fn(Arc<HttpContext>) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async closure into a [`HookFn`]
pub fn hook<F, Fut>(f: F) -> HookFn
where
    F: Fn(Arc<HttpContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Mutable hook collection used during application wiring
#[derive(Default)]
pub struct HookSet {
    before: Vec<HookFn>,
    after: Vec<HookFn>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback run before route dispatch
    pub fn before(&mut self, callback: HookFn) {
        self.before.push(callback);
    }

    /// Register a callback run after the chain (or short-circuit) completes
    pub fn after(&mut self, callback: HookFn) {
        self.after.push(callback);
    }

    /// Freeze ordering into an immutable, shareable hook list
    pub fn commit(self) -> Hooks {
        Hooks {
            before: self.before.into(),
            after: self.after.into(),
        }
    }
}

/// Committed hooks, read-only and freely shared across request tasks
#[derive(Clone)]
pub struct Hooks {
    before: Arc<[HookFn]>,
    after: Arc<[HookFn]>,
}

impl Hooks {
    /// Run before hooks in registration order.
    ///
    /// Returns `Ok(true)` when a hook wrote a terminal response: remaining
    /// before hooks and the main chain must be skipped. A hook error aborts
    /// the sequence and propagates to the exception router.
    pub async fn execute_before(&self, ctx: &Arc<HttpContext>) -> Result<bool, Error> {
        if self.before.is_empty() {
            return Ok(false);
        }

        for callback in self.before.iter() {
            callback(ctx.clone()).await?;
            if ctx.response_written() {
                trace!(request_id = %ctx.request_id, "Before hook short-circuited pipeline");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run after hooks in registration order. A hook error aborts the
    /// remaining after hooks and propagates.
    pub async fn execute_after(&self, ctx: &Arc<HttpContext>) -> Result<(), Error> {
        if self.after.is_empty() {
            return Ok(());
        }

        for callback in self.after.iter() {
            callback(ctx.clone()).await?;
        }
        Ok(())
    }
}
