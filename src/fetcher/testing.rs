use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::fetcher::{RequestOptions, Transport, TransportResponse};

/// Serves canned responses keyed by method and address.
#[derive(Default)]
pub struct StaticTransport {
    routes: HashMap<(Method, String), TransportResponse>,
    requests: Mutex<Vec<(Method, String)>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, address: &str, headers: &[(&str, &str)], body: &str) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        self.routes.insert(
            (method, address.to_string()),
            TransportResponse {
                status: StatusCode::OK,
                headers: map,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn get(self, address: &str, headers: &[(&str, &str)], body: &str) -> Self {
        self.route(Method::GET, address, headers, body)
    }

    pub fn head(self, address: &str, headers: &[(&str, &str)]) -> Self {
        self.route(Method::HEAD, address, headers, "")
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn request(&self, address: &str, options: RequestOptions) -> Option<TransportResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((options.method.clone(), address.to_string()));

        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return None;
        }
        self.routes.get(&(options.method, address.to_string())).cloned()
    }
}
