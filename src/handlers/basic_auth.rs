//! HTTP Basic authentication gate, applied before a rule's handler runs when
//! the rule configures `auth_user`.

use base64::Engine;

use crate::config::types::ContentRule;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

/// `Ok(())` if the request is authorized (or the rule doesn't require
/// auth); `Err(response)` with the 401 challenge otherwise.
pub fn check(rule: &ContentRule, request: &HttpRequest) -> Result<(), HttpResponse> {
    if !rule.requires_auth() {
        return Ok(());
    }

    let challenge = || {
        let realm = if rule.auth_realm.is_empty() {
            "restricted"
        } else {
            &rule.auth_realm
        };
        HttpResponse::new(401)
            .set_header("WWW-Authenticate", format!("Basic realm=\"{realm}\""))
            .set_body(b"401 Unauthorized\n".to_vec(), "text/plain")
    };

    let Some(header) = request.header_value("authorization", 0) else {
        return Err(challenge());
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return Err(challenge());
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return Err(challenge());
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Err(challenge());
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return Err(challenge());
    };

    if user == rule.auth_user && pass == rule.auth_pass {
        Ok(())
    } else {
        Err(challenge())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_with_auth() -> ContentRule {
        let mut rule = ContentRule::default();
        rule.auth_user = "alice".to_string();
        rule.auth_pass = "secret".to_string();
        rule
    }

    #[test]
    fn no_auth_configured_always_passes() {
        let rule = ContentRule::default();
        let req = HttpRequest::new(8192, 16384, 1024);
        assert!(check(&rule, &req).is_ok());
    }

    #[test]
    fn missing_header_challenges() {
        let rule = rule_with_auth();
        let req = HttpRequest::new(8192, 16384, 1024);
        let err = check(&rule, &req).unwrap_err();
        assert_eq!(err.status_code, 401);
    }

    #[test]
    fn correct_credentials_pass() {
        let rule = rule_with_auth();
        let mut req = HttpRequest::new(8192, 16384, 1024);
        req.feed(b"GET / HTTP/1.1\r\nHost: x\r\nAuthorization: Basic YWxpY2U6c2VjcmV0\r\n\r\n");
        req.parse().unwrap();
        assert!(check(&rule, &req).is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let rule = rule_with_auth();
        let mut req = HttpRequest::new(8192, 16384, 1024);
        req.feed(b"GET / HTTP/1.1\r\nHost: x\r\nAuthorization: Basic YWxpY2U6d3Jvbmc=\r\n\r\n");
        req.parse().unwrap();
        assert!(check(&rule, &req).is_err());
    }
}
