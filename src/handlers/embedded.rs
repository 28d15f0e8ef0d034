//! Serves a response whose entire body is stored verbatim in the
//! configuration file, for small static payloads (health checks, robots.txt,
//! a canned maintenance page) that aren't worth a file on disk.

use crate::config::types::ContentRule;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

/// Set at compile time (e.g. `ORIGINSERVER_BUILD_TIMESTAMP=$(date -u +%s) cargo
/// build`) to give embedded blobs a cheap `ETag`; absent by default, in which
/// case every request gets a fresh 200.
const BUILD_TIMESTAMP: Option<&str> = option_env!("ORIGINSERVER_BUILD_TIMESTAMP");

pub fn serve(rule: &ContentRule, request: &HttpRequest) -> HttpResponse {
    serve_with_build_tag(rule, request, BUILD_TIMESTAMP)
}

fn serve_with_build_tag(
    rule: &ContentRule,
    request: &HttpRequest,
    build_tag: Option<&str>,
) -> HttpResponse {
    let content_type = if rule.content_type.is_empty() {
        "text/plain"
    } else {
        &rule.content_type
    };

    if let Some(ts) = build_tag {
        if HttpResponse::etag_matches(ts, request.header_value("if-none-match", 0)) {
            return HttpResponse::not_modified(ts);
        }
        return HttpResponse::new(200)
            .set_body(rule.body.clone().into_bytes(), content_type)
            .with_etag(ts);
    }

    HttpResponse::new(200).set_body(rule.body.clone().into_bytes(), content_type)
}
