use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use derive_yaml::FromYaml;

use super::parser::{ConfigError, ConfigParser, FromYaml, ParseResult};

/// `HashMap<u16, String>`, wrapped so it names a single identifier as a
/// struct field type. The derive macro's field scanner splits on every top
/// level comma it sees before the next field's colon, so a raw two-parameter
/// generic there would swallow the field that follows it.
#[derive(Debug, Clone, Default)]
pub struct ErrorPageMap(pub HashMap<u16, String>);

impl Deref for ErrorPageMap {
    type Target = HashMap<u16, String>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ErrorPageMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromYaml for ErrorPageMap {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        Ok(ErrorPageMap(HashMap::from_yaml(parser, min_indent)?))
    }
}

/// `HashMap<String, String>`, wrapped for the same reason as [`ErrorPageMap`].
#[derive(Debug, Clone, Default)]
pub struct StringMap(pub HashMap<String, String>);

impl Deref for StringMap {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StringMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromYaml for StringMap {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        Ok(StringMap(HashMap::from_yaml(parser, min_indent)?))
    }
}

/// How a [`ContentRule`]'s `url` pattern is matched against an incoming
/// request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The request path must equal `url` exactly.
    Exact,
    /// The request path must start with `url` (byte prefix, no segment
    /// boundary requirement).
    Prefix,
    /// The request path must start with `url` at a `/` segment boundary;
    /// `url` is treated as a directory.
    DirectoryPrefix,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Exact
    }
}

impl FromYaml for MatchMode {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let s = String::from_yaml(parser, min_indent)?;
        match s.as_str() {
            "exact" => Ok(MatchMode::Exact),
            "prefix" => Ok(MatchMode::Prefix),
            "directory-prefix" | "directory_prefix" => Ok(MatchMode::DirectoryPrefix),
            other => Err(ConfigError::new(
                format!("Invalid match mode: '{other}' (expected exact, prefix, or directory-prefix)"),
                loc,
            )),
        }
    }
}

/// Which handler a [`ContentRule`] dispatches to once matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Disk,
    Embedded,
    Redirect,
    Dynamic,
}

impl Default for HandlerKind {
    fn default() -> Self {
        HandlerKind::Disk
    }
}

impl FromYaml for HandlerKind {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let s = String::from_yaml(parser, min_indent)?;
        match s.as_str() {
            "disk" => Ok(HandlerKind::Disk),
            "embedded" => Ok(HandlerKind::Embedded),
            "redirect" => Ok(HandlerKind::Redirect),
            "dynamic" => Ok(HandlerKind::Dynamic),
            other => Err(ConfigError::new(
                format!(
                    "Invalid handler kind: '{other}' (expected disk, embedded, redirect, or dynamic)"
                ),
                loc,
            )),
        }
    }
}

/// One entry of a server block's ordered content-rule list. Rules are
/// evaluated in file order; the first whose `host` (if set) and `url`
/// (under `match_mode`) both match wins, unless `stop` is false and the
/// handler declines, in which case the walk continues.
#[derive(Debug, Clone, FromYaml)]
pub struct ContentRule {
    pub host: String,
    pub url: String,
    pub match_mode: MatchMode,
    pub stop: bool,
    pub methods: Vec<String>,
    pub handler: HandlerKind,

    // disk handler
    pub root: String,
    pub default_file: String,
    pub autoindex: bool,

    // embedded handler
    pub body: String,
    pub content_type: String,

    // redirect handler
    pub redirect_target: String,
    pub redirect_code: u16,

    // optional basic-auth gate, applied before the handler above runs
    pub auth_user: String,
    pub auth_pass: String,
    pub auth_realm: String,

    // dynamic handler: looked up by name in the server's handler registry
    pub handler_name: String,
}

impl Default for ContentRule {
    fn default() -> Self {
        ContentRule {
            host: String::new(),
            url: "/".to_string(),
            match_mode: MatchMode::Prefix,
            stop: true,
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            handler: HandlerKind::Disk,
            root: "./www".to_string(),
            default_file: "index.html".to_string(),
            autoindex: false,
            body: String::new(),
            content_type: String::new(),
            redirect_target: String::new(),
            redirect_code: 308,
            auth_user: String::new(),
            auth_pass: String::new(),
            auth_realm: String::new(),
            handler_name: String::new(),
        }
    }
}

impl ContentRule {
    pub fn requires_auth(&self) -> bool {
        !self.auth_user.is_empty()
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub host6: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_pages: ErrorPageMap,
    pub client_max_body_size: usize,
    pub max_request_line_len: usize,
    pub max_header_len: usize,
    pub max_write_buffer_len: usize,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub idle_timeout_secs: u64,
    pub canonicalize_urls: bool,
    pub extra_headers: StringMap,
    pub mime_overrides: StringMap,
    pub rules: Vec<ContentRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            host6: String::new(),
            ports: vec![8080],
            server_name: "_".to_string(),
            default_server: false,
            error_pages: ErrorPageMap::default(),
            client_max_body_size: 1_048_576,
            max_request_line_len: 8192,
            max_header_len: 16384,
            max_write_buffer_len: 262_144,
            max_connections: 1024,
            max_connections_per_ip: 64,
            idle_timeout_secs: 60,
            canonicalize_urls: true,
            extra_headers: StringMap::default(),
            mime_overrides: StringMap::default(),
            rules: Vec::new(),
        }
    }
}


impl ContentRule {
    pub fn matches(&self, path: &str) -> bool {
        match self.match_mode {
            MatchMode::Exact => path == self.url,
            MatchMode::Prefix => path.starts_with(&self.url),
            MatchMode::DirectoryPrefix => {
                if !path.starts_with(&self.url) {
                    return false;
                }
                let rest = &path[self.url.len()..];
                if self.url.ends_with('/') {
                    !rest.is_empty()
                } else {
                    rest.is_empty() || rest.starts_with('/')
                }
            }
        }
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
    pub user: String,
    pub chroot: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            servers: Vec::new(),
            user: String::new(),
            chroot: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_prefix_requires_segment_boundary() {
        let mut r = ContentRule::default();
        r.url = "/static".to_string();
        r.match_mode = MatchMode::DirectoryPrefix;
        assert!(r.matches("/static"));
        assert!(r.matches("/static/a.png"));
        assert!(!r.matches("/staticky"));
    }

    #[test]
    fn exact_match_mode() {
        let mut r = ContentRule::default();
        r.url = "/healthz".to_string();
        r.match_mode = MatchMode::Exact;
        assert!(r.matches("/healthz"));
        assert!(!r.matches("/healthz/"));
    }

    #[test]
    fn prefix_match_mode_is_byte_prefix() {
        let mut r = ContentRule::default();
        r.url = "/api".to_string();
        r.match_mode = MatchMode::Prefix;
        assert!(r.matches("/api/v1"));
        assert!(r.matches("/apiary"));
    }

    #[test]
    fn directory_prefix_with_trailing_slash_excludes_the_bare_directory() {
        let mut r = ContentRule::default();
        r.url = "/static/".to_string();
        r.match_mode = MatchMode::DirectoryPrefix;
        assert!(!r.matches("/static/"));
        assert!(r.matches("/static/a.png"));
        assert!(!r.matches("/static"));
    }
}
