//! Progressive HTTP/1.x request parser.
//!
//! An [`HttpRequest`] owns a growable byte buffer and a cursor into it, and
//! is fed socket reads via [`HttpRequest::feed`]. Parsing advances through
//! [`ParsingState`] as far as the buffered bytes allow and then yields
//! [`ConnError::Incomplete`] for the connection to poll for more data — it
//! never blocks and never assumes a full request arrived in one read.

use std::collections::HashSet;

use crate::error::ConnError;
use crate::http::method::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    ChunkedBody,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCrlf,
    ReadTrailers,
}

const MAX_CHUNK_SIZE_LINE: usize = 32;

pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub query: Option<String>,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub trailers: Vec<(String, String)>,
    pub body: Vec<u8>,

    pub state: ParsingState,
    chunk_state: ChunkState,

    buffer: Vec<u8>,
    cursor: usize,

    content_length: Option<usize>,
    is_chunked: bool,
    body_remaining: usize,

    max_request_line_len: usize,
    max_header_len: usize,
    max_body_len: usize,

    /// `\r\n` vs bare `\n`, fixed by the request line and enforced for the
    /// rest of the message.
    crlf: bool,
}

impl HttpRequest {
    pub fn new(max_request_line_len: usize, max_header_len: usize, max_body_len: usize) -> Self {
        HttpRequest {
            method: Method::Get,
            url: String::new(),
            path: String::new(),
            query: None,
            version: String::new(),
            headers: Vec::new(),
            trailers: Vec::new(),
            body: Vec::new(),
            state: ParsingState::RequestLine,
            chunk_state: ChunkState::ReadSize,
            buffer: Vec::new(),
            cursor: 0,
            content_length: None,
            is_chunked: false,
            body_remaining: 0,
            max_request_line_len,
            max_header_len,
            max_body_len,
            crlf: true,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParsingState::Complete
    }

    /// Drains everything consumed so far, keeping any bytes already received
    /// for the next request on the same connection, and resets parser state.
    pub fn reset_for_next_request(&mut self) {
        self.buffer.drain(0..self.cursor);
        self.cursor = 0;
        self.method = Method::Get;
        self.url.clear();
        self.path.clear();
        self.query = None;
        self.version.clear();
        self.headers.clear();
        self.trailers.clear();
        self.body.clear();
        self.state = ParsingState::RequestLine;
        self.chunk_state = ChunkState::ReadSize;
        self.content_length = None;
        self.is_chunked = false;
        self.body_remaining = 0;
        self.crlf = true;
    }

    pub fn has_unconsumed_bytes(&self) -> bool {
        self.buffer.len() > self.cursor
    }

    /// Returns the `skip`-th (0-indexed) value of a possibly-repeated header,
    /// matched case-insensitively.
    pub fn header_value(&self, name: &str, skip: usize) -> Option<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .nth(skip)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .count()
    }

    /// Advances parsing as far as the currently buffered bytes allow.
    /// Returns `Ok(())` once [`ParsingState::Complete`] is reached, or
    /// `Err(ConnError::Incomplete)` when more bytes are needed.
    pub fn parse(&mut self) -> Result<(), ConnError> {
        loop {
            match self.state {
                ParsingState::RequestLine => self.parse_request_line()?,
                ParsingState::Headers => self.parse_headers()?,
                ParsingState::HeadersDone => self.setup_body_parsing()?,
                ParsingState::Body => self.parse_unchunked_body()?,
                ParsingState::ChunkedBody => self.parse_chunked_body()?,
                ParsingState::Complete => return Ok(()),
            }
        }
    }

    fn find_line_end(&self, start: usize) -> Option<(usize, usize)> {
        // returns (index of first byte of terminator, length of terminator)
        let mut i = start;
        while i < self.buffer.len() {
            if self.buffer[i] == b'\n' {
                if i > start && self.buffer[i - 1] == b'\r' {
                    return Some((i - 1, 2));
                }
                return Some((i, 1));
            }
            i += 1;
        }
        None
    }

    fn parse_request_line(&mut self) -> Result<(), ConnError> {
        // tolerate leading blank lines before the request line
        while let Some((idx, len)) = self.find_line_end(self.cursor) {
            if idx == self.cursor {
                self.cursor = idx + len;
                continue;
            }
            break;
        }

        if self.buffer.len() - self.cursor > self.max_request_line_len {
            return Err(ConnError::RequestTooLarge);
        }

        let Some((idx, term_len)) = self.find_line_end(self.cursor) else {
            if self.buffer.len() - self.cursor > self.max_request_line_len {
                return Err(ConnError::RequestTooLarge);
            }
            return Err(ConnError::Incomplete);
        };

        self.crlf = term_len == 2;
        let line = std::str::from_utf8(&self.buffer[self.cursor..idx])
            .map_err(|_| ConnError::InvalidUtf8)?;

        let mut parts = line.split_whitespace();
        let method_tok = parts.next().ok_or(ConnError::MalformedRequestLine)?;
        let raw_url = parts.next().ok_or(ConnError::MalformedRequestLine)?;
        let version = parts.next().ok_or(ConnError::MalformedRequestLine)?;
        if parts.next().is_some() {
            return Err(ConnError::MalformedRequestLine);
        }
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ConnError::MalformedRequestLine);
        }

        let method: Method = method_tok.parse().unwrap();
        if matches!(method, Method::Unknown(_)) {
            return Err(ConnError::InvalidMethod);
        }

        let (path, query) = split_query(raw_url);
        self.method = method;
        self.url = raw_url.to_string();
        self.path = path;
        self.query = query;
        self.version = version.to_string();

        self.cursor = idx + term_len;
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn parse_headers(&mut self) -> Result<(), ConnError> {
        loop {
            if self.buffer.len() - self.cursor > self.max_header_len {
                return Err(ConnError::HeaderTooLong);
            }
            let Some((idx, term_len)) = self.find_line_end(self.cursor) else {
                return Err(ConnError::Incomplete);
            };
            if idx == self.cursor {
                // blank line: end of header block
                self.cursor = idx + term_len;
                break;
            }
            if term_len != if self.crlf { 2 } else { 1 } {
                return Err(ConnError::InvalidHeaderValue);
            }

            let line = std::str::from_utf8(&self.buffer[self.cursor..idx])
                .map_err(|_| ConnError::InvalidUtf8)?;
            let Some(colon) = line.find(':') else {
                return Err(ConnError::InvalidHeaderName);
            };
            let name = line[..colon].trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ConnError::InvalidHeaderName);
            }
            let value = line[colon + 1..].trim();
            self.headers.push((name.to_ascii_lowercase(), value.to_string()));

            if self.headers.len() > 200 {
                return Err(ConnError::TooManyHeaders);
            }

            self.cursor = idx + term_len;
        }

        self.validate_headers()?;
        self.state = ParsingState::HeadersDone;
        Ok(())
    }

    fn validate_headers(&self) -> Result<(), ConnError> {
        let host_count = self.header_count("host");
        if self.version == "HTTP/1.1" && host_count == 0 {
            return Err(ConnError::MissingHost);
        }
        if host_count > 1 {
            return Err(ConnError::DuplicateHeader("Host".to_string()));
        }

        let cl_values: HashSet<&str> = self
            .headers
            .iter()
            .filter(|(k, _)| k == "content-length")
            .map(|(_, v)| v.as_str())
            .collect();
        if cl_values.len() > 1 {
            return Err(ConnError::DuplicateHeader("Content-Length".to_string()));
        }

        Ok(())
    }

    fn setup_body_parsing(&mut self) -> Result<(), ConnError> {
        let transfer_encoding = self.header_value("transfer-encoding", 0).map(str::to_string);
        let content_length = self.header_value("content-length", 0).map(str::to_string);

        if let Some(te) = transfer_encoding {
            if !te.eq_ignore_ascii_case("chunked") {
                return Err(ConnError::UnsupportedTransferEncoding(te));
            }
            self.is_chunked = true;
            self.chunk_state = ChunkState::ReadSize;
            self.state = ParsingState::ChunkedBody;
            return Ok(());
        }

        if let Some(cl) = content_length {
            let len: usize = cl.parse().map_err(|_| ConnError::InvalidHeaderValue)?;
            if len > self.max_body_len {
                return Err(ConnError::PayloadTooLarge);
            }
            self.body_remaining = len;
            self.state = ParsingState::Body;
            return Ok(());
        }

        self.state = ParsingState::Complete;
        Ok(())
    }

    fn parse_unchunked_body(&mut self) -> Result<(), ConnError> {
        if self.body_remaining == 0 {
            self.state = ParsingState::Complete;
            return Ok(());
        }
        let available = self.buffer.len() - self.cursor;
        let to_take = available.min(self.body_remaining);
        self.body
            .extend_from_slice(&self.buffer[self.cursor..self.cursor + to_take]);
        self.cursor += to_take;
        self.body_remaining -= to_take;

        if self.body_remaining == 0 {
            self.state = ParsingState::Complete;
            Ok(())
        } else {
            Err(ConnError::Incomplete)
        }
    }

    fn parse_chunked_body(&mut self) -> Result<(), ConnError> {
        loop {
            match self.chunk_state {
                ChunkState::ReadSize => {
                    let Some((idx, term_len)) = self.find_line_end(self.cursor) else {
                        if self.buffer.len() - self.cursor > MAX_CHUNK_SIZE_LINE {
                            return Err(ConnError::InvalidChunkSize);
                        }
                        return Err(ConnError::Incomplete);
                    };
                    let line = std::str::from_utf8(&self.buffer[self.cursor..idx])
                        .map_err(|_| ConnError::InvalidChunkSize)?;
                    let size_str = line.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(size_str, 16)
                        .map_err(|_| ConnError::InvalidChunkSize)?;
                    self.cursor = idx + term_len;

                    if self.body.len() + size > self.max_body_len {
                        return Err(ConnError::PayloadTooLarge);
                    }

                    if size == 0 {
                        self.chunk_state = ChunkState::ReadTrailers;
                    } else {
                        self.chunk_state = ChunkState::ReadData(size);
                    }
                }
                ChunkState::ReadData(remaining) => {
                    let available = self.buffer.len() - self.cursor;
                    if available == 0 {
                        return Err(ConnError::Incomplete);
                    }
                    let to_take = available.min(remaining);
                    self.body
                        .extend_from_slice(&self.buffer[self.cursor..self.cursor + to_take]);
                    self.cursor += to_take;
                    let left = remaining - to_take;
                    if left == 0 {
                        self.chunk_state = ChunkState::ReadTrailingCrlf;
                    } else {
                        self.chunk_state = ChunkState::ReadData(left);
                        return Err(ConnError::Incomplete);
                    }
                }
                ChunkState::ReadTrailingCrlf => {
                    let needed = if self.crlf { 2 } else { 1 };
                    if self.buffer.len() - self.cursor < needed {
                        return Err(ConnError::Incomplete);
                    }
                    if self.crlf && &self.buffer[self.cursor..self.cursor + 2] != b"\r\n" {
                        return Err(ConnError::InvalidChunkSize);
                    }
                    self.cursor += needed;
                    self.chunk_state = ChunkState::ReadSize;
                }
                ChunkState::ReadTrailers => {
                    loop {
                        let Some((idx, term_len)) = self.find_line_end(self.cursor) else {
                            return Err(ConnError::Incomplete);
                        };
                        if idx == self.cursor {
                            self.cursor = idx + term_len;
                            self.state = ParsingState::Complete;
                            return Ok(());
                        }
                        let line = std::str::from_utf8(&self.buffer[self.cursor..idx])
                            .map_err(|_| ConnError::InvalidUtf8)?;
                        if let Some(colon) = line.find(':') {
                            let name = line[..colon].trim().to_ascii_lowercase();
                            let value = line[colon + 1..].trim().to_string();
                            self.trailers.push((name, value));
                        }
                        self.cursor = idx + term_len;
                    }
                }
            }
        }
    }
}

fn split_query(raw_url: &str) -> (String, Option<String>) {
    match raw_url.rfind('?') {
        Some(idx) => (
            raw_url[..idx].to_string(),
            Some(raw_url[idx + 1..].to_string()),
        ),
        None => (raw_url.to_string(), None),
    }
}

/// Collapses repeated `/`, resolves `.`/`..` segments, and clamps ascent at
/// the root. Idempotent: running it twice yields the same string as running
/// it once.
pub fn canonicalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::from("/");
    out.push_str(&segments.join("/"));
    if path.ends_with('/') && out != "/" {
        out.push('/');
    }
    out
}
