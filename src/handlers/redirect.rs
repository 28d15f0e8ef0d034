//! Serves a fixed redirect configured directly on a content rule.

use crate::config::types::ContentRule;
use crate::http::response::HttpResponse;

pub fn serve(rule: &ContentRule) -> HttpResponse {
    let code = if rule.redirect_code == 0 {
        308
    } else {
        rule.redirect_code
    };
    HttpResponse::redirect(&rule.redirect_target, code)
}
