//! Route table and matcher.
//!
//! Routes are registered on a `RouterBuilder` and frozen by `commit()`,
//! which parses every pattern once, validates it, and orders the table by
//! specificity. Lookup walks the ordered table and returns the first match,
//! so static segments beat params and earlier registrations beat later ones.

use crate::handler::HandlerFn;
use crate::http::HttpMethod;
use crate::middleware::MiddlewareRef;
use crate::Error;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Most patterns are short; keep their tokens inline
type SegmentVec = SmallVec<[Segment; 4]>;

/// One parsed pattern token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, matched exactly
    Static(String),
    /// `:name`, captures one segment
    Param(String),
    /// `:name?`, captures one segment or nothing; trailing only
    OptionalParam(String),
    /// `*name`, captures the rest of the path; last token only
    Wildcard(String),
}

impl Segment {
    /// Specificity rank used to order the route table
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Param(_) => 1,
            Segment::OptionalParam(_) => 2,
            Segment::Wildcard(_) => 3,
        }
    }
}

/// An immutable route: pattern tokens, middleware references and handler
pub struct Route {
    pub method: HttpMethod,
    pub pattern: String,
    pub name: Option<String>,
    pub middleware: Vec<MiddlewareRef>,
    pub handler: HandlerFn,
    segments: SegmentVec,
    /// Position in the committed table, used to look up the compiled chain
    pub(crate) id: usize,
}

impl Route {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a request path against this route's tokens.
    /// Returns captured params on success.
    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = HashMap::new();
        let mut i = 0;

        for segment in &self.segments {
            match segment {
                Segment::Static(text) => {
                    if parts.get(i) != Some(&text.as_str()) {
                        return None;
                    }
                    i += 1;
                }
                Segment::Param(name) => {
                    let part = parts.get(i)?;
                    params.insert(name.clone(), (*part).to_string());
                    i += 1;
                }
                Segment::OptionalParam(name) => {
                    if let Some(part) = parts.get(i) {
                        params.insert(name.clone(), (*part).to_string());
                        i += 1;
                    }
                }
                Segment::Wildcard(name) => {
                    if i >= parts.len() {
                        return None;
                    }
                    params.insert(name.clone(), parts[i..].join("/"));
                    i = parts.len();
                }
            }
        }

        if i == parts.len() {
            Some(params)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .finish()
    }
}

/// Result of a route lookup. Not matching anything is a normal outcome,
/// handled by the not-found chain, never an error.
#[derive(Debug)]
pub enum RouteMatch {
    Found {
        route: Arc<Route>,
        params: HashMap<String, String>,
    },
    NotFound,
}

struct PendingRoute {
    method: HttpMethod,
    pattern: String,
    name: Option<String>,
    middleware: Vec<MiddlewareRef>,
    handler: HandlerFn,
}

/// Mutable registration phase of the route table
#[derive(Default)]
pub struct RouterBuilder {
    pending: Vec<PendingRoute>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Pattern validation happens at `commit()`.
    pub fn register(
        &mut self,
        method: HttpMethod,
        pattern: impl Into<String>,
        middleware: Vec<MiddlewareRef>,
        handler: HandlerFn,
        name: Option<String>,
    ) {
        self.pending.push(PendingRoute {
            method,
            pattern: pattern.into(),
            name,
            middleware,
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Parse, validate and order the table. Invalid patterns are fatal.
    ///
    /// Borrows the builder, so a failed commit leaves every registration in
    /// place and can be retried after the registration is fixed.
    pub fn commit(&self) -> Result<Router, Error> {
        let mut routes = Vec::with_capacity(self.pending.len());

        for pending in &self.pending {
            let segments = parse_pattern(&pending.pattern)?;
            routes.push(Route {
                method: pending.method,
                pattern: pending.pattern.clone(),
                name: pending.name.clone(),
                middleware: pending.middleware.clone(),
                handler: pending.handler.clone(),
                segments,
                id: 0,
            });
        }

        // Stable sort by position-wise token rank, so `/users/me` outranks
        // `/users/:id` and registration order breaks ties.
        routes.sort_by(|a, b| {
            let ra = a.segments.iter().map(Segment::rank);
            let rb = b.segments.iter().map(Segment::rank);
            ra.cmp(rb)
        });

        let routes: Vec<Arc<Route>> = routes
            .into_iter()
            .enumerate()
            .map(|(id, mut route)| {
                route.id = id;
                Arc::new(route)
            })
            .collect();

        debug!(routes = routes.len(), "Route table committed");
        Ok(Router { routes })
    }
}

/// The frozen route table
#[derive(Debug)]
pub struct Router {
    routes: Vec<Arc<Route>>,
}

impl Router {
    /// Find the first route matching the method and path
    pub fn find(&self, method: HttpMethod, path: &str) -> RouteMatch {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.matches(path) {
                return RouteMatch::Found {
                    route: route.clone(),
                    params,
                };
            }
        }
        RouteMatch::NotFound
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Parse a route pattern into tokens, enforcing placement rules
fn parse_pattern(pattern: &str) -> Result<SegmentVec, Error> {
    let invalid = |reason: &str| Error::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with `/`"));
    }

    let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut segments = SegmentVec::new();
    let mut seen = std::collections::HashSet::new();

    for (i, part) in parts.iter().enumerate() {
        let last = i == parts.len() - 1;

        let segment = if let Some(rest) = part.strip_prefix(':') {
            if let Some(name) = rest.strip_suffix('?') {
                if name.is_empty() {
                    return Err(invalid("optional param needs a name"));
                }
                if !last {
                    return Err(invalid("optional param is only allowed in trailing position"));
                }
                Segment::OptionalParam(name.to_string())
            } else {
                if rest.is_empty() {
                    return Err(invalid("param needs a name"));
                }
                Segment::Param(rest.to_string())
            }
        } else if let Some(name) = part.strip_prefix('*') {
            if name.is_empty() {
                return Err(invalid("wildcard needs a name"));
            }
            if !last {
                return Err(invalid("wildcard is only allowed as the last token"));
            }
            Segment::Wildcard(name.to_string())
        } else {
            Segment::Static((*part).to_string())
        };

        match &segment {
            Segment::Param(n) | Segment::OptionalParam(n) | Segment::Wildcard(n) => {
                if !seen.insert(n.clone()) {
                    return Err(invalid("duplicate param name"));
                }
            }
            Segment::Static(_) => {}
        }

        segments.push(segment);
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;

    fn noop() -> HandlerFn {
        handler(|_ctx| async { Ok(()) })
    }

    fn committed(patterns: &[&str]) -> Router {
        let mut builder = RouterBuilder::new();
        for p in patterns {
            builder.register(HttpMethod::GET, *p, Vec::new(), noop(), None);
        }
        builder.commit().unwrap()
    }

    #[test]
    fn test_static_match() {
        let router = committed(&["/health"]);
        assert!(matches!(
            router.find(HttpMethod::GET, "/health"),
            RouteMatch::Found { .. }
        ));
        assert!(matches!(
            router.find(HttpMethod::GET, "/nope"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn test_method_mismatch_is_not_found() {
        let router = committed(&["/health"]);
        assert!(matches!(
            router.find(HttpMethod::POST, "/health"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn test_param_capture() {
        let router = committed(&["/users/:id/posts/:post_id"]);
        match router.find(HttpMethod::GET, "/users/42/posts/7") {
            RouteMatch::Found { params, .. } => {
                assert_eq!(params.get("id").map(String::as_str), Some("42"));
                assert_eq!(params.get("post_id").map(String::as_str), Some("7"));
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_static_beats_param() {
        let mut builder = RouterBuilder::new();
        builder.register(HttpMethod::GET, "/users/:id", Vec::new(), noop(), Some("by_id".into()));
        builder.register(HttpMethod::GET, "/users/me", Vec::new(), noop(), Some("me".into()));
        let router = builder.commit().unwrap();

        match router.find(HttpMethod::GET, "/users/me") {
            RouteMatch::Found { route, .. } => {
                assert_eq!(route.name.as_deref(), Some("me"));
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_first_registered_wins_among_equals() {
        let mut builder = RouterBuilder::new();
        builder.register(HttpMethod::GET, "/items/:a", Vec::new(), noop(), Some("first".into()));
        builder.register(HttpMethod::GET, "/items/:b", Vec::new(), noop(), Some("second".into()));
        let router = builder.commit().unwrap();

        match router.find(HttpMethod::GET, "/items/x") {
            RouteMatch::Found { route, .. } => {
                assert_eq!(route.name.as_deref(), Some("first"));
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_optional_param_present_and_absent() {
        let router = committed(&["/files/:name?"]);

        match router.find(HttpMethod::GET, "/files/report.txt") {
            RouteMatch::Found { params, .. } => {
                assert_eq!(params.get("name").map(String::as_str), Some("report.txt"));
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }

        match router.find(HttpMethod::GET, "/files") {
            RouteMatch::Found { params, .. } => {
                assert!(params.get("name").is_none());
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_wildcard_captures_tail() {
        let router = committed(&["/assets/*path"]);

        match router.find(HttpMethod::GET, "/assets/css/app/main.css") {
            RouteMatch::Found { params, .. } => {
                assert_eq!(
                    params.get("path").map(String::as_str),
                    Some("css/app/main.css")
                );
            }
            RouteMatch::NotFound => panic!("expected a match"),
        }

        // Wildcard needs at least one segment
        assert!(matches!(
            router.find(HttpMethod::GET, "/assets"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn test_trailing_slash_is_equivalent() {
        let router = committed(&["/users/:id"]);
        assert!(matches!(
            router.find(HttpMethod::GET, "/users/42/"),
            RouteMatch::Found { .. }
        ));
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        let cases = [
            "users",            // missing leading slash
            "/users/:",         // unnamed param
            "/files/*",         // unnamed wildcard
            "/a/*rest/b",       // wildcard not last
            "/a/:opt?/b",       // optional not trailing
            "/pairs/:x/:x",     // duplicate name
        ];
        for pattern in cases {
            let mut builder = RouterBuilder::new();
            builder.register(HttpMethod::GET, pattern, Vec::new(), noop(), None);
            let err = builder.commit().expect_err(pattern);
            assert!(matches!(err, Error::InvalidRoutePattern { .. }), "{pattern}");
        }
    }

    #[test]
    fn test_sort_is_position_wise() {
        let mut builder = RouterBuilder::new();
        builder.register(HttpMethod::GET, "/a/:x/c", Vec::new(), noop(), Some("param_mid".into()));
        builder.register(HttpMethod::GET, "/a/b/*rest", Vec::new(), noop(), Some("static_mid".into()));
        let router = builder.commit().unwrap();

        // `/a/b/*rest` has a static second token so it sorts first.
        assert_eq!(router.routes()[0].name.as_deref(), Some("static_mid"));
        assert_eq!(router.routes()[1].name.as_deref(), Some("param_mid"));
    }

    #[test]
    fn test_root_pattern() {
        let router = committed(&["/"]);
        assert!(matches!(
            router.find(HttpMethod::GET, "/"),
            RouteMatch::Found { .. }
        ));
        assert!(matches!(
            router.find(HttpMethod::GET, "/anything"),
            RouteMatch::NotFound
        ));
    }
}
