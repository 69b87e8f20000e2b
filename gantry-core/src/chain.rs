//! Pre-compiled middleware chains.
//!
//! A [`CompiledChain`] is the composed, ready-to-invoke pipeline for one
//! route: global middleware, then route middleware, then the terminal
//! handler. Chains are built once at `optimize()` so per-request dispatch is
//! a plain index walk instead of registry lookups.

use crate::context::HttpContext;
use crate::handler::HandlerFn;
use crate::middleware::Middleware;
use crate::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Continuation into the remainder of a compiled chain.
///
/// One `Next` is created per middleware invocation frame. The guard flag
/// makes a second `run` on the same frame fail with
/// `Error::NextCalledTwice` instead of re-entering the chain.
pub struct Next {
    chain: Arc<CompiledChain>,
    index: usize,
    owner: String,
    invoked: AtomicBool,
}

impl Next {
    fn new(chain: Arc<CompiledChain>, index: usize, owner: &str) -> Self {
        Self {
            chain,
            index,
            owner: owner.to_string(),
            invoked: AtomicBool::new(false),
        }
    }

    /// Invoke the rest of the chain. Valid at most once per frame.
    pub async fn run(&self, ctx: Arc<HttpContext>) -> Result<(), Error> {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return Err(Error::NextCalledTwice(self.owner.clone()));
        }
        self.chain.clone().invoke_from(self.index, ctx).await
    }
}

/// A composed middleware + handler pipeline for one route.
///
/// Immutable once produced; freely shared across request tasks.
pub struct CompiledChain {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: HandlerFn,
}

impl CompiledChain {
    /// Compose global middleware, route middleware, and the handler into a
    /// single chain. Global middleware run first, in registration order.
    pub fn compile(
        global: &[Arc<dyn Middleware>],
        route_middleware: Vec<Arc<dyn Middleware>>,
        handler: HandlerFn,
    ) -> Arc<Self> {
        let mut middleware = Vec::with_capacity(global.len() + route_middleware.len());
        middleware.extend(global.iter().cloned());
        middleware.extend(route_middleware);

        Arc::new(Self {
            middleware,
            handler,
        })
    }

    /// Number of middleware in the chain
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run the chain from the top
    pub async fn run(self: Arc<Self>, ctx: Arc<HttpContext>) -> Result<(), Error> {
        self.invoke_from(0, ctx).await
    }

    fn invoke_from(
        self: Arc<Self>,
        index: usize,
        ctx: Arc<HttpContext>,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>> {
        Box::pin(async move {
            if index >= self.middleware.len() {
                trace!("Chain complete, invoking handler");
                return (self.handler)(ctx).await;
            }

            let middleware = self.middleware[index].clone();
            trace!(index, middleware = middleware.name(), "Invoking middleware");
            let next = Next::new(self.clone(), index + 1, middleware.name());
            middleware.handle(ctx, next).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::http::{HttpMethod, HttpRequest};
    use crate::middleware::middleware_fn;
    use crate::profiler::{NullProfiler, Profiler};
    use parking_lot::Mutex;

    fn test_context() -> Arc<HttpContext> {
        HttpContext::new(
            HttpRequest::new(HttpMethod::GET, "/"),
            "test".to_string(),
            tracing::Span::none(),
            NullProfiler.start("test"),
        )
    }

    fn recording_handler(log: Arc<Mutex<Vec<&'static str>>>) -> HandlerFn {
        handler(move |ctx| {
            let log = log.clone();
            async move {
                log.lock().push("handler");
                ctx.with_response(|r| r.send(200, b"ok".to_vec()));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_middleware_run_in_order_then_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = log.clone();
            middleware_fn(move |ctx, next| {
                let log = log.clone();
                async move {
                    log.lock().push("first");
                    next.run(ctx).await
                }
            })
        };
        let second = {
            let log = log.clone();
            middleware_fn(move |ctx, next| {
                let log = log.clone();
                async move {
                    log.lock().push("second");
                    next.run(ctx).await
                }
            })
        };

        let chain = CompiledChain::compile(&[first], vec![second], recording_handler(log.clone()));
        chain.run(test_context()).await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_of_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let gate = {
            let log = log.clone();
            middleware_fn(move |ctx, _next| {
                let log = log.clone();
                async move {
                    log.lock().push("gate");
                    ctx.with_response(|r| r.send(401, b"denied".to_vec()));
                    Ok(())
                }
            })
        };
        let tail = {
            let log = log.clone();
            middleware_fn(move |ctx, next| {
                let log = log.clone();
                async move {
                    log.lock().push("tail");
                    next.run(ctx).await
                }
            })
        };

        let ctx = test_context();
        let chain =
            CompiledChain::compile(&[], vec![gate, tail], recording_handler(log.clone()));
        chain.run(ctx.clone()).await.unwrap();

        assert_eq!(*log.lock(), vec!["gate"]);
        assert_eq!(ctx.status(), 401);
    }

    #[tokio::test]
    async fn test_double_next_is_detected() {
        let greedy = middleware_fn(|ctx: Arc<HttpContext>, next: Next| async move {
            next.run(ctx.clone()).await?;
            next.run(ctx).await
        });

        let chain = CompiledChain::compile(
            &[],
            vec![greedy],
            handler(|_ctx| async { Ok(()) }),
        );
        let result = chain.run(test_context()).await;

        match result {
            Err(Error::NextCalledTwice(_)) => {}
            other => panic!("expected NextCalledTwice, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_chain_runs_handler_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = CompiledChain::compile(&[], vec![], recording_handler(log.clone()));
        assert!(chain.is_empty());

        tokio_test::block_on(chain.run(test_context())).unwrap();
        assert_eq!(*log.lock(), vec!["handler"]);
    }

    #[tokio::test]
    async fn test_middleware_error_propagates() {
        let failing = middleware_fn(|_ctx: Arc<HttpContext>, _next: Next| async {
            Err(Error::Unauthorized("no token".to_string()))
        });

        let chain = CompiledChain::compile(
            &[],
            vec![failing],
            handler(|_ctx| async { Ok(()) }),
        );
        let result = chain.run(test_context()).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }
}
