//! Server orchestrator.
//!
//! `Server` has two phases. During registration the builders accept routes,
//! middleware, hooks, an exception handler and providers. `optimize()`
//! freezes everything: the route table is committed, every middleware
//! reference and the exception handler are resolved through the container,
//! and one chain per route (plus a not-found chain) is pre-compiled, so
//! per-request dispatch is a table lookup. `handle()` and `serve()` refuse
//! to run before `optimize()`.

use crate::chain::CompiledChain;
use crate::container::{Container, Provider};
use crate::context::{set_ambient_enabled, HttpContext};
use crate::exception::{ExceptionHandlerRef, ExceptionRouter};
use crate::handler::{handler, HandlerFn};
use crate::hooks::{HookFn, HookSet, Hooks};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::middleware::{Middleware, MiddlewareRef, MiddlewareRegistry};
use crate::profiler::{NullProfiler, SharedProfiler};
use crate::router::{RouteMatch, Router, RouterBuilder};
use crate::Error;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

/// Server settings, plain struct with builder methods
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Publish the request context to the ambient task-local scope
    pub ambient_context: bool,
    /// Force the `Accept` header to this media type before dispatch
    pub forced_accept: Option<String>,
    /// Inbound header consulted for the correlation id, echoed on responses
    pub request_id_header: String,
    /// Value of the `Server` response header, omitted when `None`
    pub server_header: Option<String>,
    /// HTTP/1.1 keep-alive
    pub keep_alive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ambient_context: false,
            forced_accept: None,
            request_id_header: "x-request-id".to_string(),
            server_header: Some("gantry".to_string()),
            keep_alive: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ambient_context(mut self, enable: bool) -> Self {
        self.ambient_context = enable;
        self
    }

    pub fn force_accept(mut self, media_type: impl Into<String>) -> Self {
        self.forced_accept = Some(media_type.into());
        self
    }

    pub fn request_id_header(mut self, name: impl Into<String>) -> Self {
        self.request_id_header = name.into().to_lowercase();
        self
    }

    pub fn server_header(mut self, value: Option<String>) -> Self {
        self.server_header = value;
        self
    }

    pub fn keep_alive(mut self, enable: bool) -> Self {
        self.keep_alive = enable;
        self
    }
}

/// Frozen dispatch state produced by `optimize()`
struct Optimized {
    router: Router,
    /// One pre-compiled chain per route, indexed by route id
    chains: Vec<Arc<CompiledChain>>,
    not_found: Arc<CompiledChain>,
    hooks: Hooks,
    exceptions: ExceptionRouter,
    ambient: bool,
}

pub struct Server {
    config: ServerConfig,
    container: Container,
    routes: RouterBuilder,
    middleware: MiddlewareRegistry,
    hooks: HookSet,
    exception_handler: Option<ExceptionHandlerRef>,
    profiler: SharedProfiler,
    optimized: Option<Optimized>,
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            container: Container::new(),
            routes: RouterBuilder::new(),
            middleware: MiddlewareRegistry::new(),
            hooks: HookSet::new(),
            exception_handler: None,
            profiler: Arc::new(NullProfiler),
            optimized: None,
        }
    }

    // Registration phase

    /// Register a route with per-route middleware
    pub fn route(
        &mut self,
        method: HttpMethod,
        pattern: impl Into<String>,
        middleware: Vec<MiddlewareRef>,
        handler: HandlerFn,
    ) -> &mut Self {
        self.routes.register(method, pattern, middleware, handler, None);
        self
    }

    /// Register a named route with per-route middleware
    pub fn named_route(
        &mut self,
        method: HttpMethod,
        pattern: impl Into<String>,
        middleware: Vec<MiddlewareRef>,
        handler: HandlerFn,
        name: impl Into<String>,
    ) -> &mut Self {
        self.routes
            .register(method, pattern, middleware, handler, Some(name.into()));
        self
    }

    pub fn get(&mut self, pattern: impl Into<String>, h: HandlerFn) -> &mut Self {
        self.route(HttpMethod::GET, pattern, Vec::new(), h)
    }

    pub fn post(&mut self, pattern: impl Into<String>, h: HandlerFn) -> &mut Self {
        self.route(HttpMethod::POST, pattern, Vec::new(), h)
    }

    pub fn put(&mut self, pattern: impl Into<String>, h: HandlerFn) -> &mut Self {
        self.route(HttpMethod::PUT, pattern, Vec::new(), h)
    }

    pub fn delete(&mut self, pattern: impl Into<String>, h: HandlerFn) -> &mut Self {
        self.route(HttpMethod::DELETE, pattern, Vec::new(), h)
    }

    /// Append a global middleware reference, run on every request
    pub fn use_middleware(&mut self, reference: MiddlewareRef) -> &mut Self {
        self.middleware.register_global(reference);
        self
    }

    /// Register a named middleware instance
    pub fn register_middleware<M: Middleware + 'static>(
        &mut self,
        name: impl Into<String>,
        m: M,
    ) -> &mut Self {
        self.middleware.register_named(name, m);
        self
    }

    /// Register a named middleware factory, instantiated once at `optimize()`
    pub fn register_middleware_factory<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Container) -> Result<Arc<dyn Middleware>, Error> + Send + Sync + 'static,
    {
        self.middleware.register_named_factory(name, factory);
        self
    }

    pub fn before(&mut self, hook: HookFn) -> &mut Self {
        self.hooks.before(hook);
        self
    }

    pub fn after(&mut self, hook: HookFn) -> &mut Self {
        self.hooks.after(hook);
        self
    }

    /// Set the exception handler. Re-registering overwrites.
    pub fn exception_handler(&mut self, reference: ExceptionHandlerRef) -> &mut Self {
        self.exception_handler = Some(reference);
        self
    }

    /// Register a provider for middleware and handler factories
    pub fn provide<T: Provider>(&mut self, instance: T) -> &mut Self {
        self.container.register(instance);
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn profiler(&mut self, profiler: SharedProfiler) -> &mut Self {
        self.profiler = profiler;
        self
    }

    // Commit phase

    /// Freeze registrations and pre-compile dispatch state.
    ///
    /// Resolves every named middleware and the exception handler, commits
    /// the route table and hooks, and compiles one chain per route plus the
    /// not-found chain. Idempotent; the second call is a no-op. Resolution
    /// failures here are fatal configuration errors.
    pub fn optimize(&mut self) -> Result<(), Error> {
        if self.optimized.is_some() {
            return Ok(());
        }

        let router = self.routes.commit()?;

        let global = self
            .middleware
            .resolve_all(&self.container, self.middleware.global_refs())?;

        let mut chains = Vec::with_capacity(router.len());
        for route in router.routes() {
            let route_mw = self.middleware.resolve_all(&self.container, &route.middleware)?;
            chains.push(CompiledChain::compile(
                &global,
                route_mw,
                route.handler.clone(),
            ));
        }

        let not_found = CompiledChain::compile(
            &global,
            Vec::new(),
            handler(|ctx| async move {
                ctx.with_response(|r| {
                    r.send_json(404, &json!({ "message": "Not Found", "path": ctx.request.path }))
                })?;
                Ok(())
            }),
        );

        let exception_handler = match &self.exception_handler {
            Some(reference) => Some(reference.resolve(&self.container)?),
            None => None,
        };

        // Every fallible step has succeeded; only now are the registration
        // builders retired. A failed optimize() keeps them intact so a retry
        // reports the same configuration error instead of an empty table.
        self.routes = RouterBuilder::new();
        let hooks = std::mem::take(&mut self.hooks).commit();

        // Process-wide latch: the first server that opts in enables ambient
        // access for the process.
        if self.config.ambient_context {
            set_ambient_enabled(true);
        }

        info!(
            routes = router.len(),
            global_middleware = global.len(),
            ambient = self.config.ambient_context,
            "Server optimized"
        );

        self.optimized = Some(Optimized {
            router,
            chains,
            not_found,
            hooks,
            exceptions: ExceptionRouter::new(exception_handler),
            ambient: self.config.ambient_context,
        });
        Ok(())
    }

    // Dispatch phase

    /// Process one request through hooks, middleware chain and finalization.
    ///
    /// Request-scoped failures are turned into responses by the exception
    /// router; the only error this returns is calling it before
    /// `optimize()`.
    pub async fn handle(&self, mut request: HttpRequest) -> Result<HttpResponse, Error> {
        let state = self
            .optimized
            .as_ref()
            .ok_or_else(|| Error::NotOptimized("handle() called before optimize()".to_string()))?;

        if let Some(media) = &self.config.forced_accept {
            request
                .headers
                .insert("accept".to_string(), media.clone());
        }

        let request_id = request
            .header(&self.config.request_id_header)
            .cloned()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );
        let profile = self
            .profiler
            .start(&format!("{} {}", request.method, request.path));

        let ctx = HttpContext::new(request, request_id.clone(), span, profile);

        if state.ambient {
            ctx.clone().run_scoped(Self::process(state, &ctx)).await;
        } else {
            Self::process(state, &ctx).await;
        }

        ctx.close_profile(Some(json!({ "status": ctx.status() })));

        let mut response = match ctx.finalize() {
            Some(response) => response,
            None => HttpResponse::internal_server_error(),
        };

        response.headers.insert(
            self.config.request_id_header.clone(),
            request_id,
        );
        response.headers.insert(
            "date".to_string(),
            httpdate::fmt_http_date(SystemTime::now()),
        );
        response
            .headers
            .insert("content-length".to_string(), response.body.len().to_string());
        if let Some(server) = &self.config.server_header {
            response
                .headers
                .insert("server".to_string(), server.clone());
        }

        debug!(status = response.status, "Request finalized");
        Ok(response)
    }

    /// Hooks and chain, with every failure diverted to the exception router.
    /// After-hooks run even when the main chain failed or short-circuited.
    async fn process(state: &Optimized, ctx: &Arc<HttpContext>) {
        if let Err(err) = Self::run_pipeline(state, ctx).await {
            state.exceptions.handle(&err, ctx).await;
        }

        if let Err(err) = state.hooks.execute_after(ctx).await {
            state.exceptions.handle(&err, ctx).await;
        }
    }

    async fn run_pipeline(state: &Optimized, ctx: &Arc<HttpContext>) -> Result<(), Error> {
        if state.hooks.execute_before(ctx).await? {
            // A before-hook wrote the terminal response.
            return Ok(());
        }

        match state.router.find(ctx.request.method, &ctx.request.path) {
            RouteMatch::Found { route, params } => {
                debug!(pattern = %route.pattern, "Route matched");
                let chain = state.chains[route.id].clone();
                ctx.set_route(route, params);
                chain.run(ctx.clone()).await
            }
            RouteMatch::NotFound => state.not_found.clone().run(ctx.clone()).await,
        }
    }

    /// Accept loop: HTTP/1.1 over tokio, one task per connection.
    ///
    /// Optimizes first if the registration phase is still open.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Accept loop over an already-bound listener
    pub async fn serve_listener(mut self, listener: TcpListener) -> Result<(), Error> {
        self.optimize()?;
        let keep_alive = self.config.keep_alive;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Server listening");
        }

        let server = Arc::new(self);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = server.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let server = server.clone();
                    async move { serve_one(server, req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .keep_alive(keep_alive)
                    .serve_connection(io, service)
                    .await
                {
                    error!(%peer, error = %err, "Connection error");
                }
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge one hyper request through the pipeline
async fn serve_one(
    server: Arc<Server>,
    req: Request<IncomingBody>,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = match HttpMethod::from_str(req.method().as_str()) {
        Some(method) => method,
        None => {
            return Ok(plain_response(
                501,
                bytes::Bytes::from_static(b"Not Implemented"),
            ))
        }
    };

    let uri = req.uri();
    let path = match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    };

    let mut request = HttpRequest::new(method, path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request
                .headers
                .insert(name.as_str().to_lowercase(), value.to_string());
        }
    }
    request.body = req.collect().await?.to_bytes().to_vec();

    let response = match server.handle(request).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Dispatch failed");
            return Ok(plain_response(
                500,
                bytes::Bytes::from_static(b"Internal Server Error"),
            ));
        }
    };

    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }
    match builder.body(Full::new(bytes::Bytes::from(response.body))) {
        Ok(response) => Ok(response),
        Err(err) => {
            error!(error = %err, "Response assembly failed");
            Ok(plain_response(
                500,
                bytes::Bytes::from_static(b"Internal Server Error"),
            ))
        }
    }
}

fn plain_response(status: u16, body: bytes::Bytes) -> Response<Full<bytes::Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() =
        http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    response
}
