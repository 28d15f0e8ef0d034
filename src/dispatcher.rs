//! Routes a parsed request to the content rule that should handle it and
//! invokes the matching handler module.
//!
//! The listener-level [`ServerConfig`] was already narrowed from the `Host`
//! header by the caller; this module walks that block's rule list in
//! declaration order, additionally filtering each candidate by the rule's
//! own `host` (for rules scoped to one virtual host within a shared block)
//! and falling through to the next matching rule when a handler reports
//! nothing found and the rule's `stop` is false.

use crate::config::types::{ContentRule, HandlerKind, ServerConfig};
use crate::handlers::dynamic::DynamicRegistry;
use crate::handlers::{basic_auth, disk, embedded, error_page, redirect};
use crate::http::method::Method;
use crate::http::request::{canonicalize_path, HttpRequest};
use crate::http::response::HttpResponse;

pub enum DispatchOutcome {
    Response(HttpResponse),
    File {
        headers: HttpResponse,
        file: std::fs::File,
        len: u64,
    },
}

/// What a handler reported for one candidate rule, before `finish` adjusts
/// the outcome for the request method.
enum HandlerOutcome {
    Done(DispatchOutcome),
    /// The handler has nothing for this request (e.g. no file at the
    /// resolved path). If the rule's `stop` is false, the dispatcher tries
    /// the next matching rule instead of answering with this one's 404.
    NotFound,
}

impl DispatchOutcome {
    /// For HEAD requests: a `File` outcome still reports `Content-Length`
    /// but must not stream a body, so collapse it to a headers-only response.
    fn into_head(self) -> DispatchOutcome {
        match self {
            DispatchOutcome::Response(r) => DispatchOutcome::Response(r.into_head_response()),
            DispatchOutcome::File { headers, .. } => {
                DispatchOutcome::Response(headers.into_head_response())
            }
        }
    }
}

/// Picks which of the server blocks bound to a listener should handle this
/// request, by matching the `Host` header (port stripped) against
/// `server_name`. Falls back to whichever candidate has `default_server`
/// set, then to the first candidate.
fn host_without_port(host_header: Option<&str>) -> &str {
    host_header
        .map(|h| h.rsplit_once(':').map_or(h, |(h, _)| h))
        .unwrap_or("")
}

pub fn resolve_server<'a>(
    configs: &'a [ServerConfig],
    candidates: &[usize],
    host_header: Option<&str>,
) -> &'a ServerConfig {
    let host = host_without_port(host_header);

    if let Some(idx) = candidates
        .iter()
        .find(|&&i| configs[i].server_name == host)
    {
        return &configs[*idx];
    }
    if let Some(idx) = candidates.iter().find(|&&i| configs[i].default_server) {
        return &configs[*idx];
    }
    &configs[candidates[0]]
}

pub fn dispatch(
    server: &ServerConfig,
    request: &HttpRequest,
    registry: &DynamicRegistry,
) -> DispatchOutcome {
    if !request.method.is_dispatchable() {
        return DispatchOutcome::Response(method_not_allowed(&["GET", "HEAD", "POST"]));
    }

    let path = if server.canonicalize_urls {
        canonicalize_path(&request.path)
    } else {
        request.path.clone()
    };
    let host = host_without_port(request.header_value("host", 0));

    for rule in server
        .rules
        .iter()
        .filter(|r| (r.host.is_empty() || r.host == host) && r.matches(&path))
    {
        if !rule.allows_method(request.method.as_str()) {
            return finish(
                DispatchOutcome::Response(
                    HttpResponse::new(405)
                        .set_header("Allow", rule.methods.join(", "))
                        .set_body(b"405 Method Not Allowed\n".to_vec(), "text/plain"),
                ),
                request,
            );
        }

        if let Err(challenge) = basic_auth::check(rule, request) {
            return finish(DispatchOutcome::Response(challenge), request);
        }

        match invoke_handler(rule, request, registry, server) {
            HandlerOutcome::Done(outcome) => return finish(outcome, request),
            HandlerOutcome::NotFound if rule.stop => {
                return finish(DispatchOutcome::Response(error_page::build(404, server)), request);
            }
            HandlerOutcome::NotFound => continue,
        }
    }

    finish(DispatchOutcome::Response(error_page::build(404, server)), request)
}

fn invoke_handler(
    rule: &ContentRule,
    request: &HttpRequest,
    registry: &DynamicRegistry,
    server: &ServerConfig,
) -> HandlerOutcome {
    match rule.handler {
        HandlerKind::Disk => match disk::serve(rule, request, server) {
            disk::ServeOutcome::NotFound => HandlerOutcome::NotFound,
            disk::ServeOutcome::Response(r) => HandlerOutcome::Done(DispatchOutcome::Response(r)),
            disk::ServeOutcome::File { headers, file, len } => {
                HandlerOutcome::Done(DispatchOutcome::File { headers, file, len })
            }
        },
        HandlerKind::Embedded => {
            HandlerOutcome::Done(DispatchOutcome::Response(embedded::serve(rule, request)))
        }
        HandlerKind::Redirect => HandlerOutcome::Done(DispatchOutcome::Response(redirect::serve(rule))),
        HandlerKind::Dynamic => match registry.invoke(&rule.handler_name, request) {
            Some(r) => HandlerOutcome::Done(DispatchOutcome::Response(r)),
            None => {
                tracing::warn!(handler = %rule.handler_name, "dynamic handler not registered");
                HandlerOutcome::Done(DispatchOutcome::Response(error_page::build(500, server)))
            }
        },
    }
}

fn finish(outcome: DispatchOutcome, request: &HttpRequest) -> DispatchOutcome {
    if request.method == Method::Head {
        outcome.into_head()
    } else {
        outcome
    }
}

fn method_not_allowed(allowed: &[&str]) -> HttpResponse {
    HttpResponse::new(405)
        .set_header("Allow", allowed.join(", "))
        .set_body(b"405 Method Not Allowed\n".to_vec(), "text/plain")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::MatchMode;

    fn req(method: &str, path: &str) -> HttpRequest {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(format!("{method} {path} HTTP/1.1\r\nHost: x\r\n\r\n").as_bytes());
        r.parse().unwrap();
        r
    }

    fn server_with_rule(rule: ContentRule) -> ServerConfig {
        let mut s = ServerConfig::default();
        s.rules = vec![rule];
        s
    }

    #[test]
    fn unroutable_path_is_404() {
        let mut rule = ContentRule::default();
        rule.url = "/only".to_string();
        rule.match_mode = MatchMode::Exact;
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("GET", "/elsewhere");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.status_code, 404),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn embedded_rule_matches_and_serves() {
        let mut rule = ContentRule::default();
        rule.url = "/healthz".to_string();
        rule.match_mode = MatchMode::Exact;
        rule.handler = HandlerKind::Embedded;
        rule.body = "ok".to_string();
        rule.content_type = "text/plain".to_string();
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("GET", "/healthz");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => {
                assert_eq!(r.status_code, 200);
                assert_eq!(r.body, b"ok");
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn disallowed_method_on_matched_rule_is_405() {
        let mut rule = ContentRule::default();
        rule.url = "/healthz".to_string();
        rule.match_mode = MatchMode::Exact;
        rule.handler = HandlerKind::Embedded;
        rule.methods = vec!["GET".to_string()];
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("POST", "/healthz");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.status_code, 405),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn head_request_suppresses_body() {
        let mut rule = ContentRule::default();
        rule.url = "/healthz".to_string();
        rule.match_mode = MatchMode::Exact;
        rule.handler = HandlerKind::Embedded;
        rule.methods = vec!["GET".to_string(), "HEAD".to_string()];
        rule.body = "ok".to_string();
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("HEAD", "/healthz");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => {
                assert!(r.suppress_body);
                assert!(r.body.is_empty());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn unauthorized_rule_challenges_before_handler_runs() {
        let mut rule = ContentRule::default();
        rule.url = "/secret".to_string();
        rule.match_mode = MatchMode::Exact;
        rule.handler = HandlerKind::Embedded;
        rule.auth_user = "alice".to_string();
        rule.auth_pass = "secret".to_string();
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("GET", "/secret");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.status_code, 401),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn resolve_server_matches_by_host_header() {
        let mut a = ServerConfig::default();
        a.server_name = "a.example".to_string();
        let mut b = ServerConfig::default();
        b.server_name = "b.example".to_string();
        let configs = vec![a, b];
        let picked = resolve_server(&configs, &[0, 1], Some("b.example:8080"));
        assert_eq!(picked.server_name, "b.example");
    }

    #[test]
    fn resolve_server_falls_back_to_default_server() {
        let mut a = ServerConfig::default();
        a.server_name = "a.example".to_string();
        let mut b = ServerConfig::default();
        b.server_name = "b.example".to_string();
        b.default_server = true;
        let configs = vec![a, b];
        let picked = resolve_server(&configs, &[0, 1], Some("unknown.example"));
        assert_eq!(picked.server_name, "b.example");
    }

    #[test]
    fn non_dispatchable_method_is_405_before_routing() {
        let rule = ContentRule::default();
        let server = server_with_rule(rule);
        let registry = DynamicRegistry::new();
        let request = req("PUT", "/anything");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.status_code, 405),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn not_stopping_rule_falls_through_to_next_match_on_missing_file() {
        let dir = std::env::temp_dir().join(format!(
            "originserver_dispatcher_fallthrough_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut disk_rule = ContentRule::default();
        disk_rule.url = "/".to_string();
        disk_rule.match_mode = MatchMode::Prefix;
        disk_rule.handler = HandlerKind::Disk;
        disk_rule.root = dir.to_string_lossy().into_owned();
        disk_rule.stop = false;

        let mut fallback_rule = ContentRule::default();
        fallback_rule.url = "/".to_string();
        fallback_rule.match_mode = MatchMode::Prefix;
        fallback_rule.handler = HandlerKind::Embedded;
        fallback_rule.body = "fallback".to_string();

        let mut server = ServerConfig::default();
        server.rules = vec![disk_rule, fallback_rule];
        let registry = DynamicRegistry::new();
        let request = req("GET", "/missing.txt");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => {
                assert_eq!(r.status_code, 200);
                assert_eq!(r.body, b"fallback");
            }
            _ => panic!("expected fallback response"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stopping_rule_answers_404_without_trying_later_rules() {
        let dir = std::env::temp_dir().join(format!(
            "originserver_dispatcher_stop_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut disk_rule = ContentRule::default();
        disk_rule.url = "/".to_string();
        disk_rule.match_mode = MatchMode::Prefix;
        disk_rule.handler = HandlerKind::Disk;
        disk_rule.root = dir.to_string_lossy().into_owned();
        disk_rule.stop = true;

        let mut fallback_rule = ContentRule::default();
        fallback_rule.url = "/".to_string();
        fallback_rule.match_mode = MatchMode::Prefix;
        fallback_rule.handler = HandlerKind::Embedded;
        fallback_rule.body = "fallback".to_string();

        let mut server = ServerConfig::default();
        server.rules = vec![disk_rule, fallback_rule];
        let registry = DynamicRegistry::new();
        let request = req("GET", "/missing.txt");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.status_code, 404),
            _ => panic!("expected response"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rule_scoped_to_another_host_is_skipped() {
        let mut other_host_rule = ContentRule::default();
        other_host_rule.host = "other.example".to_string();
        other_host_rule.url = "/healthz".to_string();
        other_host_rule.match_mode = MatchMode::Exact;
        other_host_rule.handler = HandlerKind::Embedded;
        other_host_rule.body = "other".to_string();

        let mut catch_all = ContentRule::default();
        catch_all.url = "/healthz".to_string();
        catch_all.match_mode = MatchMode::Exact;
        catch_all.handler = HandlerKind::Embedded;
        catch_all.body = "default".to_string();

        let mut server = ServerConfig::default();
        server.rules = vec![other_host_rule, catch_all];
        let registry = DynamicRegistry::new();
        let request = req("GET", "/healthz");
        match dispatch(&server, &request, &registry) {
            DispatchOutcome::Response(r) => assert_eq!(r.body, b"default"),
            _ => panic!("expected response"),
        }
    }
}
