// HTTP request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP methods understood by the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request wrapper
///
/// Immutable inbound data once the context is created. Query parameters are
/// split off the path at construction time.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let raw: String = path.into();
        let (path, query_params) = match raw.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query_string(q)),
            None => (raw, HashMap::new()),
        };

        Self {
            method,
            path,
            headers: HashMap::new(),
            body: Vec::new(),
            query_params,
        }
    }

    /// Get a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers
            .get(name)
            .or_else(|| self.headers.get(&name.to_lowercase()))
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Attach a header. Keys are stored lowercased, matching how the
    /// transport layer normalizes inbound headers.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// HTTP response accumulator
///
/// The `written` flag records that a terminal body/status has been set; the
/// hook runner uses it to detect short-circuits, and the server refuses to
/// finalize twice.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    written: bool,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            written: false,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn accepted() -> Self {
        Self::new(202)
    }

    pub fn empty() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn unauthorized() -> Self {
        Self::new(401)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn conflict() -> Self {
        Self::new(409)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn service_unavailable() -> Self {
        Self::new(503)
    }

    /// 200 response with a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, crate::Error> {
        Self::ok().with_json(value)
    }

    /// 200 response with a plain text body
    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::ok();
        response
            .headers
            .insert("Content-Type".to_string(), "text/plain; charset=utf-8".to_string());
        response.body = body.into().into_bytes();
        response.written = true;
        response
    }

    /// 200 response with an HTML body
    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Self::ok();
        response
            .headers
            .insert("Content-Type".to_string(), "text/html; charset=utf-8".to_string());
        response.body = body.into().into_bytes();
        response.written = true;
        response
    }

    /// 302 redirect
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut response = Self::new(302);
        response.headers.insert("Location".to_string(), location.into());
        response.written = true;
        response
    }

    /// 301 redirect
    pub fn redirect_permanent(location: impl Into<String>) -> Self {
        let mut response = Self::new(301);
        response.headers.insert("Location".to_string(), location.into());
        response.written = true;
        response
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self.written = true;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.written = true;
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn content_type(self, value: &str) -> Self {
        self.with_header("Content-Type", value)
    }

    pub fn cache_control(self, value: &str) -> Self {
        self.with_header("Cache-Control", value)
    }

    pub fn no_cache(self) -> Self {
        self.with_header("Cache-Control", "no-store, no-cache, must-revalidate")
    }

    /// Whether a terminal body/status has been written
    pub fn written(&self) -> bool {
        self.written
    }

    /// Mark the response terminal without changing the body, used when a
    /// hook or handler sets the status alone
    pub fn mark_written(&mut self) {
        self.written = true;
    }

    /// Replace status and body in one terminal write
    pub fn send(&mut self, status: u16, body: Vec<u8>) {
        self.status = status;
        self.body = body;
        self.written = true;
    }

    /// Terminal JSON write onto an existing accumulator
    pub fn send_json<T: Serialize>(&mut self, status: u16, value: &T) -> Result<(), crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.status = status;
        self.written = true;
        Ok(())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(HttpMethod::from_str("get"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str("POST"), Some(HttpMethod::POST));
        assert_eq!(HttpMethod::from_str("BREW"), None);
        assert_eq!(HttpMethod::DELETE.as_str(), "DELETE");
    }

    #[test]
    fn test_request_query_split() {
        let req = HttpRequest::new(HttpMethod::GET, "/users?page=2&limit=10");
        assert_eq!(req.path, "/users");
        assert_eq!(req.query("page"), Some(&"2".to_string()));
        assert_eq!(req.query("limit"), Some(&"10".to_string()));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = HttpRequest::new(HttpMethod::GET, "/")
            .with_header("X-Request-Id", "req-9");
        assert_eq!(req.header("x-request-id").map(String::as_str), Some("req-9"));
        assert_eq!(req.header("X-Request-Id").map(String::as_str), Some("req-9"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn test_request_json_body() {
        #[derive(Deserialize)]
        struct Payload {
            name: String,
        }

        let req = HttpRequest::new(HttpMethod::POST, "/users")
            .with_body(br#"{"name":"ada"}"#.to_vec());
        let payload: Payload = req.json().unwrap();
        assert_eq!(payload.name, "ada");

        let bad = HttpRequest::new(HttpMethod::POST, "/users").with_body(b"not json".to_vec());
        assert!(bad.json::<Payload>().is_err());
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::json(&serde_json::json!({"message": "hello"})).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            response.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert!(response.written());

        let response = HttpResponse::html("<h1>Hi</h1>");
        assert_eq!(
            response.headers.get("Content-Type"),
            Some(&"text/html; charset=utf-8".to_string())
        );

        let response = HttpResponse::redirect("/login");
        assert_eq!(response.status, 302);
        assert_eq!(response.headers.get("Location"), Some(&"/login".to_string()));
    }

    #[test]
    fn test_written_flag() {
        let mut response = HttpResponse::ok();
        assert!(!response.written());

        response.send(201, b"created".to_vec());
        assert!(response.written());
        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"created".to_vec());
    }

    #[test]
    fn test_classification() {
        assert!(HttpResponse::ok().is_success());
        assert!(HttpResponse::redirect("/").is_redirect());
        assert!(HttpResponse::not_found().is_client_error());
        assert!(HttpResponse::internal_server_error().is_server_error());
    }
}
