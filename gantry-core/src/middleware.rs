//! Middleware contract and registry.
//!
//! Middleware are referenced either inline (a ready instance) or by name.
//! Named entries resolve through the registry, optionally instantiating a
//! class-based middleware from the dependency registry. Resolution happens
//! exactly once per distinct name, at `optimize()` time; an unknown name is
//! a fatal configuration error, never a per-request one.

use crate::chain::Next;
use crate::container::Container;
use crate::context::HttpContext;
use crate::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Middleware trait for processing requests before they reach the handler.
///
/// `next` is the continuation into the remainder of the chain. A middleware
/// may call it zero or one times: not calling it intentionally terminates
/// the chain, calling it twice is a detected usage error.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: Arc<HttpContext>, next: Next) -> Result<(), Error>;

    /// Name used in logs and double-continuation errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Arc<HttpContext>, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    async fn handle(&self, ctx: Arc<HttpContext>, next: Next) -> Result<(), Error> {
        (self.f)(ctx, next).await
    }

    fn name(&self) -> &str {
        "fn_middleware"
    }
}

/// Wrap an async closure into a middleware instance
pub fn middleware_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(Arc<HttpContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(FnMiddleware { f })
}

/// A reference to a middleware: inline instance or named registry lookup
#[derive(Clone)]
pub enum MiddlewareRef {
    Instance(Arc<dyn Middleware>),
    Named(String),
}

impl MiddlewareRef {
    pub fn named(name: impl Into<String>) -> Self {
        MiddlewareRef::Named(name.into())
    }

    pub fn inline<M: Middleware + 'static>(middleware: M) -> Self {
        MiddlewareRef::Instance(Arc::new(middleware))
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareRef::Instance(m) => write!(f, "Instance({})", m.name()),
            MiddlewareRef::Named(name) => write!(f, "Named({name})"),
        }
    }
}

/// Factory that builds a middleware from the dependency registry
pub type MiddlewareFactory =
    Arc<dyn Fn(&Container) -> Result<Arc<dyn Middleware>, Error> + Send + Sync>;

enum NamedSource {
    Instance(Arc<dyn Middleware>),
    Factory(MiddlewareFactory),
}

/// Registry of global and named middleware.
///
/// Mutated only during application wiring; after `optimize()` it is only
/// read through the resolution cache.
#[derive(Default)]
pub struct MiddlewareRegistry {
    global: Vec<MiddlewareRef>,
    named: HashMap<String, NamedSource>,
    resolved: Mutex<HashMap<String, Arc<dyn Middleware>>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware run for every request, in registration order
    pub fn register_global(&mut self, reference: MiddlewareRef) {
        self.global.push(reference);
    }

    /// Register a named middleware instance
    pub fn register_named<M: Middleware + 'static>(&mut self, name: impl Into<String>, m: M) {
        self.named
            .insert(name.into(), NamedSource::Instance(Arc::new(m)));
    }

    /// Register a named middleware built from the dependency registry.
    ///
    /// The factory runs during `optimize()`, never on the request path.
    pub fn register_named_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Container) -> Result<Arc<dyn Middleware>, Error> + Send + Sync + 'static,
    {
        self.named
            .insert(name.into(), NamedSource::Factory(Arc::new(factory)));
    }

    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// The global middleware references, in registration order
    pub fn global_refs(&self) -> &[MiddlewareRef] {
        &self.global
    }

    /// Turn a reference into an invocable middleware instance.
    ///
    /// Named references are resolved at most once per name; factory results
    /// are cached so collaborator instantiation happens a single time per
    /// process.
    pub fn resolve(
        &self,
        container: &Container,
        reference: &MiddlewareRef,
    ) -> Result<Arc<dyn Middleware>, Error> {
        match reference {
            MiddlewareRef::Instance(m) => Ok(m.clone()),
            MiddlewareRef::Named(name) => {
                if let Some(cached) = self.resolved.lock().get(name) {
                    return Ok(cached.clone());
                }

                let instance = match self.named.get(name) {
                    Some(NamedSource::Instance(m)) => m.clone(),
                    Some(NamedSource::Factory(factory)) => {
                        debug!(middleware = %name, "Instantiating middleware from factory");
                        factory(container)?
                    }
                    None => return Err(Error::UnknownMiddleware(name.clone())),
                };

                self.resolved.lock().insert(name.clone(), instance.clone());
                Ok(instance)
            }
        }
    }

    /// Resolve a list of references in order
    pub fn resolve_all(
        &self,
        container: &Container,
        references: &[MiddlewareRef],
    ) -> Result<Vec<Arc<dyn Middleware>>, Error> {
        references
            .iter()
            .map(|r| self.resolve(container, r))
            .collect()
    }
}
