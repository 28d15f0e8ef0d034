//! End-to-end routing behavior: parses real config YAML into `ServerConfig`s
//! and drives `resolve_server`/`dispatch` against them, the way a connection
//! would after reading a `Host` header and a request line. The per-rule
//! matching rules themselves (exact/prefix/directory-prefix) already have
//! unit coverage in `config::types`; these tests focus on what only shows up
//! once a whole server block is assembled from YAML and walked in order.

use originserver::config::{AppConfig, FromYaml};
use originserver::dispatcher::{dispatch, resolve_server, DispatchOutcome};
use originserver::handlers::dynamic::DynamicRegistry;
use originserver::http::HttpRequest;

fn request(method: &str, path: &str, host: &str) -> HttpRequest {
    let mut r = HttpRequest::new(8192, 16384, 1024);
    r.feed(format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\n\r\n").as_bytes());
    r.parse().unwrap();
    r
}

fn status_of(outcome: DispatchOutcome) -> u16 {
    match outcome {
        DispatchOutcome::Response(r) => r.status_code,
        DispatchOutcome::File { headers, .. } => headers.status_code,
    }
}

#[test]
fn first_matching_rule_in_file_order_wins() {
    let yaml = r#"
servers:
  - server_name: web
    rules:
      - url: "/admin"
        match_mode: exact
        handler: embedded
        body: "admin page"
        content_type: "text/plain"
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "catch all"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let server = &config.servers[0];
    let registry = DynamicRegistry::new();

    let req = request("GET", "/admin", "web");
    match dispatch(server, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"admin page"),
        _ => panic!("expected response"),
    }

    let req = request("GET", "/anything-else", "web");
    match dispatch(server, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"catch all"),
        _ => panic!("expected response"),
    }
}

#[test]
fn earlier_narrow_rule_shadows_a_later_broader_one() {
    // Declaring the broad prefix rule first means it wins even over a path
    // that would also satisfy a more specific rule declared later.
    let yaml = r#"
servers:
  - server_name: web
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "catch all"
        content_type: "text/plain"
      - url: "/api"
        match_mode: prefix
        handler: embedded
        body: "api"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let server = &config.servers[0];
    let registry = DynamicRegistry::new();

    let req = request("GET", "/api/users", "web");
    match dispatch(server, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"catch all"),
        _ => panic!("expected response, the first rule's prefix already matched"),
    }
}

#[test]
fn no_rule_matches_is_404() {
    let yaml = r#"
servers:
  - server_name: web
    rules:
      - url: "/only"
        match_mode: exact
        handler: embedded
        body: "ok"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let server = &config.servers[0];
    let registry = DynamicRegistry::new();
    let req = request("GET", "/elsewhere", "web");
    assert_eq!(status_of(dispatch(server, &req, &registry)), 404);
}

#[test]
fn virtual_hosts_sharing_a_listener_resolve_independently() {
    let yaml = r#"
servers:
  - server_name: a.example
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "site a"
        content_type: "text/plain"
  - server_name: b.example
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "site b"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let registry = DynamicRegistry::new();

    let server_a = resolve_server(&config.servers, &[0, 1], Some("a.example"));
    let req = request("GET", "/", "a.example");
    match dispatch(server_a, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"site a"),
        _ => panic!("expected response"),
    }

    let server_b = resolve_server(&config.servers, &[0, 1], Some("b.example"));
    let req = request("GET", "/", "b.example");
    match dispatch(server_b, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"site b"),
        _ => panic!("expected response"),
    }
}

#[test]
fn unknown_host_on_a_shared_listener_falls_back_to_default_server() {
    let yaml = r#"
servers:
  - server_name: a.example
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "site a"
        content_type: "text/plain"
  - server_name: catchall
    default_server: true
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        body: "default site"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let registry = DynamicRegistry::new();

    let server = resolve_server(&config.servers, &[0, 1], Some("unregistered.example"));
    let req = request("GET", "/", "unregistered.example");
    match dispatch(server, &req, &registry) {
        DispatchOutcome::Response(r) => assert_eq!(r.body, b"default site"),
        _ => panic!("expected response"),
    }
}

#[test]
fn method_not_allowed_on_a_matched_rule_names_the_allowed_set() {
    let yaml = r#"
servers:
  - server_name: web
    rules:
      - url: "/"
        match_mode: prefix
        handler: embedded
        methods: ["GET"]
        body: "ok"
        content_type: "text/plain"
"#;
    let config = AppConfig::from_str(yaml).unwrap();
    let server = &config.servers[0];
    let registry = DynamicRegistry::new();
    let req = request("POST", "/", "web");
    match dispatch(server, &req, &registry) {
        DispatchOutcome::Response(r) => {
            assert_eq!(r.status_code, 405);
            assert_eq!(r.headers.iter().find(|(k, _)| k == "Allow").map(|(_, v)| v.as_str()), Some("GET"));
        }
        _ => panic!("expected response"),
    }
}
