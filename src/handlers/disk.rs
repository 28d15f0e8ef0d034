//! Serves files from a root directory on disk: the workhorse handler for
//! static content.
//!
//! Large bodies are handed off to the write chain as a file segment rather
//! than read into memory, so `serve` returns a [`ServeOutcome`] instead of a
//! plain [`HttpResponse`] — the connection decides whether to queue bytes or
//! a `sendfile` range.

use std::fs::{self, File};
use std::path::PathBuf;

use crate::config::types::{ContentRule, ServerConfig};
use crate::handlers::error_page;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::mime::lookup_with_overrides;

pub enum ServeOutcome {
    Response(HttpResponse),
    /// No file at the resolved path. Distinct from [`ServeOutcome::Response`]
    /// so the dispatcher can fall through to the next content rule when this
    /// rule's `stop` is false, instead of the handler committing to a 404.
    NotFound,
    File {
        headers: HttpResponse,
        file: File,
        len: u64,
    },
}

pub fn serve(rule: &ContentRule, request: &HttpRequest, server: &ServerConfig) -> ServeOutcome {
    let relative = request
        .path
        .strip_prefix(&rule.url)
        .unwrap_or(&request.path)
        .trim_start_matches('/');
    let mut path = PathBuf::from(&rule.root);
    path.push(relative);

    let metadata = match fs::metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ServeOutcome::NotFound,
        Err(_) => return ServeOutcome::Response(error_page::build(403, server)),
    };

    if metadata.is_dir() {
        return serve_directory(rule, request, server, &path);
    }

    if !metadata.is_file() {
        // sockets, fifos, device files etc: nothing this server will stream.
        return ServeOutcome::Response(error_page::build(403, server));
    }

    serve_file(request, server, &path, &metadata)
}

fn serve_directory(
    rule: &ContentRule,
    request: &HttpRequest,
    server: &ServerConfig,
    dir: &PathBuf,
) -> ServeOutcome {
    if !request.path.ends_with('/') {
        let mut target = request.path.clone();
        target.push('/');
        if let Some(q) = &request.query {
            target.push('?');
            target.push_str(q);
        }
        return ServeOutcome::Response(HttpResponse::redirect(&target, 308));
    }

    if !rule.default_file.is_empty() {
        let index_path = dir.join(&rule.default_file);
        if let Ok(meta) = fs::metadata(&index_path) {
            if meta.is_file() {
                return serve_file(request, server, &index_path, &meta);
            }
        }
    }

    if rule.autoindex {
        return ServeOutcome::Response(generate_autoindex(dir, &request.path));
    }

    ServeOutcome::Response(error_page::build(403, server))
}

fn serve_file(
    request: &HttpRequest,
    server: &ServerConfig,
    path: &PathBuf,
    metadata: &fs::Metadata,
) -> ServeOutcome {
    let mtime_secs = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let etag = mtime_secs.to_string();

    if HttpResponse::etag_matches(&etag, request.header_value("if-none-match", 0)) {
        return ServeOutcome::Response(HttpResponse::not_modified(&etag));
    }

    let Ok(file) = File::open(path) else {
        return ServeOutcome::Response(error_page::build(403, server));
    };

    let content_type = lookup_with_overrides(&path.to_string_lossy(), &server.mime_overrides);
    let headers = HttpResponse::new(200)
        .set_header("Content-Length", metadata.len().to_string())
        .set_header("Content-Type", content_type)
        .with_etag(&etag);

    ServeOutcome::File {
        headers,
        file,
        len: metadata.len(),
    }
}

fn generate_autoindex(dir: &PathBuf, url_path: &str) -> HttpResponse {
    let mut entries: Vec<String> = fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    entries.sort();

    let mut body = String::new();
    body.push_str("<html><head><title>Index of ");
    body.push_str(url_path);
    body.push_str("</title></head><body><h1>Index of ");
    body.push_str(url_path);
    body.push_str("</h1><ul>");
    if url_path != "/" {
        body.push_str("<li><a href=\"../\">../</a></li>");
    }
    for name in entries {
        body.push_str(&format!("<li><a href=\"{name}\">{name}</a></li>"));
    }
    body.push_str("</ul></body></html>");

    // Content-Length reflects the rendered document, not an estimate made
    // before the listing was built.
    HttpResponse::new(200).set_body(body.into_bytes(), "text/html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "originserver_disk_test_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn req(path: &str) -> HttpRequest {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n").as_bytes());
        r.parse().unwrap();
        r
    }

    #[test]
    fn serves_existing_file() {
        let dir = temp_root();
        fs::write(dir.join("a.txt"), b"hello").unwrap();
        let mut rule = ContentRule::default();
        rule.url = "/".to_string();
        rule.root = dir.to_string_lossy().into_owned();
        let server = ServerConfig::default();
        let request = req("/a.txt");
        match serve(&rule, &request, &server) {
            ServeOutcome::File { len, .. } => assert_eq!(len, 5),
            ServeOutcome::Response(r) => panic!("expected file, got status {}", r.status_code),
            ServeOutcome::NotFound => panic!("expected file, got not found"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = temp_root();
        let mut rule = ContentRule::default();
        rule.url = "/".to_string();
        rule.root = dir.to_string_lossy().into_owned();
        let server = ServerConfig::default();
        let request = req("/missing.txt");
        assert!(matches!(serve(&rule, &request, &server), ServeOutcome::NotFound));
    }

    #[test]
    fn directory_without_trailing_slash_redirects() {
        let dir = temp_root();
        fs::create_dir_all(dir.join("sub")).unwrap();
        let mut rule = ContentRule::default();
        rule.url = "/".to_string();
        rule.root = dir.to_string_lossy().into_owned();
        let server = ServerConfig::default();
        let request = req("/sub");
        match serve(&rule, &request, &server) {
            ServeOutcome::Response(r) => {
                assert_eq!(r.status_code, 308);
                assert_eq!(
                    r.headers.iter().find(|(k, _)| k == "Location").map(|(_, v)| v.as_str()),
                    Some("/sub/")
                );
            }
            ServeOutcome::File { .. } => panic!("expected redirect"),
            ServeOutcome::NotFound => panic!("expected redirect, got not found"),
        }
    }

    #[test]
    fn directory_serves_default_file() {
        let dir = temp_root();
        fs::create_dir_all(dir.join("sub")).unwrap();
        let mut f = File::create(dir.join("sub/index.html")).unwrap();
        f.write_all(b"<h1>hi</h1>").unwrap();
        let mut rule = ContentRule::default();
        rule.url = "/".to_string();
        rule.root = dir.to_string_lossy().into_owned();
        rule.default_file = "index.html".to_string();
        let server = ServerConfig::default();
        let request = req("/sub/");
        match serve(&rule, &request, &server) {
            ServeOutcome::File { len, .. } => assert_eq!(len, 11),
            ServeOutcome::Response(r) => panic!("expected file, got {}", r.status_code),
            ServeOutcome::NotFound => panic!("expected file, got not found"),
        }
    }

    #[test]
    fn etag_match_yields_304() {
        let dir = temp_root();
        fs::write(dir.join("a.txt"), b"hello").unwrap();
        let meta = fs::metadata(dir.join("a.txt")).unwrap();
        let mtime = meta
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut rule = ContentRule::default();
        rule.url = "/".to_string();
        rule.root = dir.to_string_lossy().into_owned();
        let server = ServerConfig::default();

        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(
            format!(
                "GET /a.txt HTTP/1.1\r\nHost: x\r\nIf-None-Match: \"{mtime}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        r.parse().unwrap();

        match serve(&rule, &r, &server) {
            ServeOutcome::Response(resp) => assert_eq!(resp.status_code, 304),
            ServeOutcome::File { .. } => panic!("expected 304"),
            ServeOutcome::NotFound => panic!("expected 304, got not found"),
        }
    }
}
