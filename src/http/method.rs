use std::fmt;
use std::str::FromStr;

/// The request-line method token. `Unknown` preserves the raw token so a 501
/// response (or logging) can still report what the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Unknown(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Unknown(s) => s,
        }
    }

    /// Whether the dispatcher will even consider this method; anything else
    /// is rejected with 405 before a content rule is looked up.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Post)
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OPTIONS" => Method::Options,
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            other => Method::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_standard_methods() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
    }

    #[test]
    fn unknown_method_round_trips_token() {
        let m: Method = "PATCH".parse().unwrap();
        assert_eq!(m.as_str(), "PATCH");
        assert!(!m.is_dispatchable());
    }

    #[test]
    fn only_get_head_post_are_dispatchable() {
        assert!(Method::Get.is_dispatchable());
        assert!(Method::Head.is_dispatchable());
        assert!(Method::Post.is_dispatchable());
        assert!(!Method::Delete.is_dispatchable());
        assert!(!Method::Put.is_dispatchable());
        assert!(!Method::Options.is_dispatchable());
    }
}
