//! Per-request context and ambient propagation.
//!
//! An [`HttpContext`] bundles the inbound request, the response accumulator,
//! a request-scoped logger span, a profiler span, and the matched route. It
//! is owned by exactly one in-flight request task and destroyed once the
//! response is finalized.
//!
//! When ambient propagation is enabled, the server publishes the context
//! into a tokio task-local scope for the duration of that request's async
//! call chain. Code that cannot receive the context as a parameter reaches
//! it through [`HttpContext::get_or_fail`], which distinguishes "ambient
//! propagation disabled" from "called outside a request scope" as two
//! structured errors.

use crate::extensions::Extensions;
use crate::http::{HttpRequest, HttpResponse};
use crate::profiler::ProfilerSpan;
use crate::router::Route;
use crate::Error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Span;

tokio::task_local! {
    static CURRENT: Arc<HttpContext>;
}

/// Whether any server in this process opted into ambient propagation.
/// Latched on during `optimize()`, before any traffic.
static AMBIENT_ENABLED: AtomicBool = AtomicBool::new(false);

pub(crate) fn set_ambient_enabled(enabled: bool) {
    AMBIENT_ENABLED.store(enabled, Ordering::SeqCst);
}

/// Per-request context.
///
/// The request is immutable inbound data; the response and the fields set
/// after route matching live behind uncontended locks because the context,
/// while owned by a single task, is shared by reference through the
/// middleware chain and the ambient scope.
pub struct HttpContext {
    pub request: HttpRequest,
    pub request_id: String,
    response: Mutex<HttpResponse>,
    route: Mutex<Option<Arc<Route>>>,
    params: Mutex<HashMap<String, String>>,
    extensions: Mutex<Extensions>,
    span: Span,
    profile: Mutex<Option<Box<dyn ProfilerSpan>>>,
    finalized: AtomicBool,
}

impl HttpContext {
    /// Create a context for one inbound connection event.
    ///
    /// `span` is the request-scoped logger, pre-bound with the correlation
    /// id; `profile` is the profiling span the server opened for this
    /// request.
    pub fn new(
        request: HttpRequest,
        request_id: String,
        span: Span,
        profile: Box<dyn ProfilerSpan>,
    ) -> Arc<Self> {
        Arc::new(Self {
            request,
            request_id,
            response: Mutex::new(HttpResponse::ok()),
            route: Mutex::new(None),
            params: Mutex::new(HashMap::new()),
            extensions: Mutex::new(Extensions::new()),
            span,
            profile: Mutex::new(Some(profile)),
            finalized: AtomicBool::new(false),
        })
    }

    /// The request-scoped logger span, pre-bound with the correlation id
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Mutate the response accumulator
    pub fn with_response<R>(&self, f: impl FnOnce(&mut HttpResponse) -> R) -> R {
        f(&mut self.response.lock())
    }

    /// Whether a terminal response has been written
    pub fn response_written(&self) -> bool {
        self.response.lock().written()
    }

    /// Current response status
    pub fn status(&self) -> u16 {
        self.response.lock().status
    }

    /// Record the matched route and its captured parameters
    pub(crate) fn set_route(&self, route: Arc<Route>, params: HashMap<String, String>) {
        *self.route.lock() = Some(route);
        *self.params.lock() = params;
    }

    /// The matched route, if matching has happened
    pub fn route(&self) -> Option<Arc<Route>> {
        self.route.lock().clone()
    }

    /// Get a single route parameter by name
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.lock().get(name).cloned()
    }

    /// All captured route parameters
    pub fn params(&self) -> HashMap<String, String> {
        self.params.lock().clone()
    }

    /// Attach a typed value for downstream middleware and the handler
    pub fn set_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions.lock().insert(value);
    }

    /// Get a typed value attached earlier in the pipeline
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions.lock().get::<T>()
    }

    /// Close the profiling span, at most once
    pub(crate) fn close_profile(&self, data: Option<serde_json::Value>) {
        if let Some(span) = self.profile.lock().take() {
            span.end(data);
        }
    }

    /// Take the terminal response out of the context, at most once
    pub(crate) fn finalize(&self) -> Option<HttpResponse> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return None;
        }
        let mut response = self.response.lock();
        Some(std::mem::replace(&mut *response, HttpResponse::ok()))
    }

    // Ambient propagation

    /// Whether ambient propagation is enabled for this process
    pub fn ambient_enabled() -> bool {
        AMBIENT_ENABLED.load(Ordering::SeqCst)
    }

    /// Run `fut` with this context published to the ambient scope.
    ///
    /// The scope covers exactly the given future's call chain; the task-local
    /// is popped when the future completes, errors, or is dropped, so no
    /// residual visibility survives and concurrently running requests never
    /// observe another request's context.
    pub async fn run_scoped<F, T>(self: Arc<Self>, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        CURRENT.scope(self, fut).await
    }

    /// Fetch the ambient context, failing with a structured error.
    ///
    /// Returns `Error::InvalidAlsAccess` when ambient propagation is
    /// disabled, and `Error::InvalidAlsScope` when called outside any
    /// request scope.
    pub fn get_or_fail() -> Result<Arc<HttpContext>, Error> {
        if !Self::ambient_enabled() {
            return Err(Error::InvalidAlsAccess);
        }
        CURRENT
            .try_with(|ctx| ctx.clone())
            .map_err(|_| Error::InvalidAlsScope)
    }

    /// Fetch the ambient context if one is in scope
    pub fn try_get() -> Option<Arc<HttpContext>> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .finish()
    }
}
