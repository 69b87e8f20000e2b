use gantry_core::{handler, Error, HttpMethod, HttpRequest, RouteMatch, RouterBuilder, Server};

fn echo_param(name: &'static str) -> gantry_core::HandlerFn {
    handler(move |ctx| async move {
        let value = ctx.param(name).unwrap_or_default();
        ctx.with_response(|r| r.send(200, value.into_bytes()));
        Ok(())
    })
}

#[tokio::test]
async fn test_static_route_dispatch() {
    let mut server = Server::new();
    server.get(
        "/hello",
        handler(|ctx| async move {
            ctx.with_response(|r| r.send(200, b"Hello, World!".to_vec()));
            Ok(())
        }),
    );
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/hello"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"Hello, World!");
}

#[tokio::test]
async fn test_path_parameter_reaches_handler() {
    let mut server = Server::new();
    server.get("/users/:id", echo_param("id"));
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/users/123"))
        .await
        .unwrap();
    assert_eq!(response.body, b"123");
}

#[tokio::test]
async fn test_static_route_shadows_parameter_route() {
    let mut server = Server::new();
    server.get("/users/:id", echo_param("id"));
    server.get(
        "/users/me",
        handler(|ctx| async move {
            ctx.with_response(|r| r.send(200, b"self".to_vec()));
            Ok(())
        }),
    );
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/users/me"))
        .await
        .unwrap();
    assert_eq!(response.body, b"self");

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/users/42"))
        .await
        .unwrap();
    assert_eq!(response.body, b"42");
}

#[tokio::test]
async fn test_optional_parameter_route() {
    let mut server = Server::new();
    server.get(
        "/greet/:name?",
        handler(|ctx| async move {
            let name = ctx.param("name").unwrap_or_else(|| "stranger".to_string());
            ctx.with_response(|r| r.send(200, format!("hi {name}").into_bytes()));
            Ok(())
        }),
    );
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/greet/ada"))
        .await
        .unwrap();
    assert_eq!(response.body, b"hi ada");

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/greet"))
        .await
        .unwrap();
    assert_eq!(response.body, b"hi stranger");
}

#[tokio::test]
async fn test_wildcard_route_captures_tail() {
    let mut server = Server::new();
    server.get("/static/*file", echo_param("file"));
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/static/css/site.css"))
        .await
        .unwrap();
    assert_eq!(response.body, b"css/site.css");
}

#[tokio::test]
async fn test_method_selects_route() {
    let mut server = Server::new();
    server.get(
        "/things",
        handler(|ctx| async move {
            ctx.with_response(|r| r.send(200, b"list".to_vec()));
            Ok(())
        }),
    );
    server.post(
        "/things",
        handler(|ctx| async move {
            ctx.with_response(|r| r.send(201, b"created".to_vec()));
            Ok(())
        }),
    );
    server.optimize().unwrap();

    let get = server
        .handle(HttpRequest::new(HttpMethod::GET, "/things"))
        .await
        .unwrap();
    assert_eq!(get.status, 200);

    let post = server
        .handle(HttpRequest::new(HttpMethod::POST, "/things"))
        .await
        .unwrap();
    assert_eq!(post.status, 201);

    let delete = server
        .handle(HttpRequest::new(HttpMethod::DELETE, "/things"))
        .await
        .unwrap();
    assert_eq!(delete.status, 404);
}

#[tokio::test]
async fn test_unmatched_path_is_404_with_body() {
    let mut server = Server::new();
    server.get("/known", echo_param("x"));
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/missing"))
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(parsed["message"], "Not Found");
    assert_eq!(parsed["path"], "/missing");
}

#[tokio::test]
async fn test_query_parameters_are_parsed() {
    let mut server = Server::new();
    server.get(
        "/search",
        handler(|ctx| async move {
            let q = ctx.request.query("q").cloned().unwrap_or_default();
            ctx.with_response(|r| r.send(200, q.into_bytes()));
            Ok(())
        }),
    );
    server.optimize().unwrap();

    let response = server
        .handle(HttpRequest::new(HttpMethod::GET, "/search?q=gantry&page=2"))
        .await
        .unwrap();
    assert_eq!(response.body, b"gantry");
}

#[tokio::test]
async fn test_invalid_pattern_is_fatal_at_optimize() {
    let mut server = Server::new();
    server.get("/bad/*", echo_param("x"));
    let err = server.optimize().expect_err("pattern must be rejected");
    assert!(matches!(err, Error::InvalidRoutePattern { .. }));
}

#[test]
fn test_committed_table_ordering() {
    let mut builder = RouterBuilder::new();
    builder.register(
        HttpMethod::GET,
        "/api/:version/status",
        Vec::new(),
        handler(|_ctx| async { Ok(()) }),
        Some("versioned".into()),
    );
    builder.register(
        HttpMethod::GET,
        "/api/v1/status",
        Vec::new(),
        handler(|_ctx| async { Ok(()) }),
        Some("pinned".into()),
    );
    let router = builder.commit().unwrap();

    assert_eq!(router.routes()[0].name.as_deref(), Some("pinned"));
    match router.find(HttpMethod::GET, "/api/v1/status") {
        RouteMatch::Found { route, .. } => assert_eq!(route.name.as_deref(), Some("pinned")),
        RouteMatch::NotFound => panic!("expected a match"),
    }
}
