// Gantry - a pre-compiled HTTP request pipeline for Rust
//
// Routes, middleware chains and hooks are registered up front, frozen by
// optimize(), and dispatched with no per-request composition work.

// Re-export core functionality
pub use gantry_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        handler, hook, middleware_fn, Container, Error, ExceptionHandler, ExceptionHandlerRef,
        HandlerFn, HttpContext, HttpMethod, HttpRequest, HttpResponse, HttpStatus, LogConfig,
        Middleware, MiddlewareRef, Next, Provider, Server, ServerConfig,
    };
}
