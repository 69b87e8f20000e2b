//! Exception routing.
//!
//! Any error raised during hook or chain execution is dispatched to a single
//! configurable handler. With no handler registered a default one logs the
//! error and writes a generic response. If the registered handler itself
//! fails, the secondary failure is logged and a last-resort 500 is written:
//! a connection never ends without a terminal response.

use crate::container::Container;
use crate::context::HttpContext;
use crate::Error;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

/// Error handler contract.
///
/// The handler receives the raised error and the request context, so it can
/// inspect the matched route and request headers and write a response.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    async fn handle(&self, error: &Error, ctx: &Arc<HttpContext>) -> Result<(), Error>;
}

/// A reference to an exception handler: ready instance or container factory
#[derive(Clone)]
pub enum ExceptionHandlerRef {
    Instance(Arc<dyn ExceptionHandler>),
    Factory(Arc<dyn Fn(&Container) -> Result<Arc<dyn ExceptionHandler>, Error> + Send + Sync>),
}

impl ExceptionHandlerRef {
    pub fn inline<H: ExceptionHandler + 'static>(handler: H) -> Self {
        ExceptionHandlerRef::Instance(Arc::new(handler))
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Arc<dyn ExceptionHandler>, Error> + Send + Sync + 'static,
    {
        ExceptionHandlerRef::Factory(Arc::new(factory))
    }

    /// Resolve the reference into an instance, through the dependency
    /// registry for factory-based handlers. Done at `optimize()` time.
    pub fn resolve(&self, container: &Container) -> Result<Arc<dyn ExceptionHandler>, Error> {
        match self {
            ExceptionHandlerRef::Instance(h) => Ok(h.clone()),
            ExceptionHandlerRef::Factory(f) => {
                f(container).map_err(|e| Error::HandlerResolution(e.to_string()))
            }
        }
    }
}

/// The active exception routing state: one handler, or the default fallback
pub struct ExceptionRouter {
    handler: Option<Arc<dyn ExceptionHandler>>,
}

impl ExceptionRouter {
    pub fn new(handler: Option<Arc<dyn ExceptionHandler>>) -> Self {
        Self { handler }
    }

    /// Dispatch an error. Always leaves a terminal response on the context.
    pub async fn handle(&self, err: &Error, ctx: &Arc<HttpContext>) {
        match &self.handler {
            Some(handler) => {
                if let Err(secondary) = handler.handle(err, ctx).await {
                    error!(
                        request_id = %ctx.request_id,
                        original = %err,
                        secondary = %secondary,
                        "Exception handler failed, writing last-resort response"
                    );
                    Self::write_generic(ctx, 500);
                }
            }
            None => {
                debug!(request_id = %ctx.request_id, "No exception handler registered, using default");
                Self::default_handle(err, ctx);
            }
        }

        // The handler may have inspected the error without responding.
        if !ctx.response_written() {
            Self::write_generic(ctx, err.status_code());
        }
    }

    /// Default behavior: log, then respond with the error's status. Client
    /// errors expose the message; server errors get a generic body.
    fn default_handle(err: &Error, ctx: &Arc<HttpContext>) {
        let status = err.status_code();

        if err.is_server_error() {
            error!(
                request_id = %ctx.request_id,
                method = %ctx.request.method,
                path = %ctx.request.path,
                error = %err,
                code = err.code().unwrap_or("-"),
                "Request failed"
            );
            Self::write_generic(ctx, status);
        } else {
            debug!(
                request_id = %ctx.request_id,
                status,
                error = %err,
                "Request rejected"
            );
            let message = err.to_string();
            ctx.with_response(|r| {
                let _ = r.send_json(status, &json!({ "message": message }));
            });
        }
    }

    fn write_generic(ctx: &Arc<HttpContext>, status: u16) {
        let message = crate::HttpStatus::from_code(status)
            .unwrap_or(crate::HttpStatus::InternalServerError)
            .reason_phrase();
        ctx.with_response(|r| {
            let _ = r.send_json(status, &json!({ "message": message }));
        });
    }
}
