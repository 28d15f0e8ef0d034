//! Registry for application-supplied handlers. Content rules reference one
//! by name (`handler_name`) since the configuration file has no way to
//! express a Rust closure; the embedding binary registers implementations
//! before the event loop starts.

use std::collections::HashMap;

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

pub type DynamicHandlerFn = dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync;

#[derive(Default)]
pub struct DynamicRegistry {
    handlers: HashMap<String, Box<DynamicHandlerFn>>,
}

impl DynamicRegistry {
    pub fn new() -> Self {
        DynamicRegistry {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, f: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) {
        self.handlers.insert(name.into(), Box::new(f));
    }

    pub fn invoke(&self, name: &str, request: &HttpRequest) -> Option<HttpResponse> {
        self.handlers.get(name).map(|f| f(request))
    }
}
