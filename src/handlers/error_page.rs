//! Synthesizes the body for a non-2xx response: a configured error-page file
//! if one is registered for the status code, otherwise a short plain-text
//! fallback.

use std::fs;

use crate::config::types::ServerConfig;
use crate::http::response::{status_text, HttpResponse};
use crate::mime::lookup_with_overrides;

pub fn build(code: u16, server: &ServerConfig) -> HttpResponse {
    if let Some(path) = server.error_pages.get(&code) {
        if let Ok(body) = fs::read(path) {
            let content_type = lookup_with_overrides(path, &server.mime_overrides);
            return HttpResponse::new(code).set_body(body, &content_type);
        }
        tracing::warn!(code, path, "configured error page unreadable, using fallback body");
    }

    let text = format!("{code} {}\n", status_text(code));
    HttpResponse::new(code).set_body(text.into_bytes(), "text/plain")
}
