// Core library for the Gantry HTTP pipeline
// Route table, middleware chains, hooks, exception routing and the server loop

pub mod chain;
pub mod container;
pub mod context;
pub mod error;
pub mod exception;
pub mod extensions;
pub mod handler;
pub mod hooks;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod profiler;
pub mod router;
pub mod server;
pub mod status;

// Re-export commonly used types
pub use chain::{CompiledChain, Next};
pub use container::{Container, Provider};
pub use context::HttpContext;
pub use error::Error;
pub use exception::{ExceptionHandler, ExceptionHandlerRef, ExceptionRouter};
pub use extensions::Extensions;
pub use handler::{handler, HandlerFn};
pub use hooks::{hook, HookFn, HookSet, Hooks};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use middleware::{middleware_fn, Middleware, MiddlewareRef, MiddlewareRegistry};
pub use profiler::{NullProfiler, Profiler, ProfilerSpan, SharedProfiler, TracingProfiler};
pub use router::{Route, RouteMatch, Router, RouterBuilder, Segment};
pub use server::{Server, ServerConfig};
pub use status::HttpStatus;
