//! Scripted transport double for state-machine tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use transport::{Error as TransportError, Result as TransportResult, Transport};

/// Transport with queued responses per method and a record of every request.
pub struct StubTransport {
    gets: Mutex<VecDeque<TransportResult<serde_json::Value>>>,
    posts: Mutex<VecDeque<TransportResult<serde_json::Value>>>,
    requests: Mutex<Vec<(&'static str, String)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            gets: Mutex::new(VecDeque::new()),
            posts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_get(&self, response: TransportResult<serde_json::Value>) {
        self.gets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    pub fn push_post(&self, response: TransportResult<serde_json::Value>) {
        self.posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Every request issued so far, as `(method, url)` pairs.
    pub fn requests(&self) -> Vec<(&'static str, String)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get_count(&self) -> usize {
        self.requests().iter().filter(|(m, _)| *m == "GET").count()
    }

    pub fn post_count(&self) -> usize {
        self.requests().iter().filter(|(m, _)| *m == "POST").count()
    }

    fn next(&self, method: &'static str, url: &str) -> TransportResult<serde_json::Value> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((method, url.to_string()));
        let queue = match method {
            "GET" => &self.gets,
            _ => &self.posts,
        };
        queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Http("no scripted response".into())))
    }
}

impl Transport for StubTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<serde_json::Value>> + Send + 'a>> {
        let response = self.next("GET", url);
        Box::pin(async move { response })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        _body: String,
    ) -> Pin<Box<dyn Future<Output = TransportResult<serde_json::Value>> + Send + 'a>> {
        let response = self.next("POST", url);
        Box::pin(async move { response })
    }
}
