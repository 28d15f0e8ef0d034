//! MIME type lookup by file extension.
//!
//! Entries are keyed by the extension spelled backwards, so a lookup reverses
//! the candidate extension once and walks the table doing a suffix compare
//! instead of a prefix compare — cheap shared prefixes (`.h`, `.ht`, `.htm`,
//! `.html`) would otherwise all hash to neighboring buckets; reversing moves
//! the high-entropy byte first.

use std::collections::HashMap;
use std::sync::OnceLock;

const TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("wasm", "application/wasm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
];

fn reversed(table: &OnceLock<HashMap<String, &'static str>>) -> &HashMap<String, &'static str> {
    table.get_or_init(|| {
        TABLE
            .iter()
            .map(|(ext, mime)| (ext.chars().rev().collect(), *mime))
            .collect()
    })
}

pub fn lookup(extension: &str) -> &'static str {
    static TABLE_REV: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    let lowered = extension.to_ascii_lowercase();
    let key: String = lowered.chars().rev().collect();
    reversed(&TABLE_REV)
        .get(&key)
        .copied()
        .unwrap_or("application/octet-stream")
}

/// Looks up the MIME type for a path's extension, applying any server-level
/// overrides (configured by plain, non-reversed extension) first.
pub fn lookup_with_overrides<'a>(
    path: &str,
    overrides: &'a std::collections::HashMap<String, String>,
) -> String {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if let Some(mime) = overrides.get(ext) {
        return mime.clone();
    }
    lookup(ext).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_extensions() {
        assert_eq!(lookup("html"), "text/html");
        assert_eq!(lookup("PNG"), "image/png");
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        assert_eq!(lookup("xyz123"), "application/octet-stream");
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = std::collections::HashMap::new();
        overrides.insert("html".to_string(), "application/xhtml+xml".to_string());
        assert_eq!(
            lookup_with_overrides("index.html", &overrides),
            "application/xhtml+xml"
        );
    }
}
