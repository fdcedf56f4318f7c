//! Scripted fake transport for filesystem tests.
//!
//! A test declares the exact sequence of requests the operation under test
//! is allowed to make, each with a canned response. Any deviation — a
//! request out of order, with the wrong shape, or left unconsumed — fails
//! the test.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gcskit::{async_trait, HttpTransport, Method, Request, Response, Result};

/// One expected request and its canned response.
pub struct Expect {
    method: Method,
    uri: String,
    range: Option<(u64, u64)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeouts: Option<(u64, u64, u64)>,
    response_status: u16,
    response_headers: Vec<(String, String)>,
    response_body: Vec<u8>,
}

impl Expect {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            range: None,
            headers: Vec::new(),
            body: None,
            timeouts: None,
            response_status: 200,
            response_headers: Vec::new(),
            response_body: Vec::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::Post, uri)
    }

    pub fn put(uri: &str) -> Self {
        Self::new(Method::Put, uri)
    }

    pub fn delete(uri: &str) -> Self {
        Self::new(Method::Delete, uri)
    }

    /// Require this inclusive byte range on the request.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Require a header with this exact value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Require this exact request body.
    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }

    /// Require this `(connect, idle, operation)` timeout triple.
    pub fn timeouts(mut self, connect: u64, idle: u64, operation: u64) -> Self {
        self.timeouts = Some((connect, idle, operation));
        self
    }

    /// Respond with this status (default 200).
    pub fn status(mut self, status: u16) -> Self {
        self.response_status = status;
        self
    }

    /// Add a response header.
    pub fn resp_header(mut self, name: &str, value: &str) -> Self {
        self.response_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Respond with this body.
    pub fn respond(mut self, body: &str) -> Self {
        self.response_body = body.as_bytes().to_vec();
        self
    }

    fn check(&self, request: &Request) {
        assert_eq!(
            request.method, self.method,
            "method mismatch for {}",
            self.uri
        );
        assert_eq!(request.uri, self.uri, "URI mismatch");
        assert_eq!(request.range, self.range, "range mismatch for {}", self.uri);
        for (name, value) in &self.headers {
            let found = request
                .headers
                .iter()
                .any(|(n, v)| n.eq_ignore_ascii_case(name) && v == value);
            assert!(
                found,
                "missing header {name}: {value} on {} (got {:?})",
                self.uri, request.headers
            );
        }
        if let Some(body) = &self.body {
            assert_eq!(
                &request.body, body,
                "body mismatch for {} (got {:?})",
                self.uri,
                String::from_utf8_lossy(&request.body)
            );
        }
        if let Some((connect, idle, operation)) = self.timeouts {
            assert_eq!(
                (
                    request.timeouts.connect,
                    request.timeouts.idle,
                    request.timeouts.operation
                ),
                (connect, idle, operation),
                "timeout mismatch for {}",
                self.uri
            );
        }
    }
}

/// Transport replaying a fixed script of [`Expect`]s in order.
pub struct FakeTransport {
    script: Mutex<VecDeque<Expect>>,
}

impl FakeTransport {
    pub fn new(script: Vec<Expect>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
        })
    }

    /// Number of scripted requests not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    /// Assert the whole script was consumed.
    pub fn assert_done(&self) {
        let left: Vec<String> = self
            .script
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.uri.clone())
            .collect();
        assert!(left.is_empty(), "unconsumed expected requests: {left:?}");
    }

    /// Wait (bounded) for background work to consume the script, then
    /// assert it did.
    pub async fn wait_done(&self) {
        for _ in 0..100 {
            if self.remaining() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.assert_done();
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let expect = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                panic!(
                    "unexpected request: {:?} {} (script exhausted)",
                    request.method, request.uri
                )
            });
        expect.check(&request);
        Ok(Response {
            status: expect.response_status,
            headers: expect.response_headers.clone(),
            body: expect.response_body.clone(),
        })
    }
}

use gcskit::{
    GcsFileSystem, Options, RetryConfig, StaticTokenProvider, StaticZoneProvider, TimeoutConfig,
};

/// Options with every cache off, short test timeouts, and no retry delay.
pub fn test_options() -> Options {
    Options {
        block_size: 0,
        max_bytes: 0,
        max_staleness_secs: 0,
        stat_cache_max_age_secs: 0,
        stat_cache_max_entries: 0,
        matching_paths_cache_max_age_secs: 0,
        matching_paths_cache_max_entries: 0,
        allowed_locations: Vec::new(),
        additional_header: None,
        timeouts: TimeoutConfig {
            connect: 5,
            idle: 1,
            metadata: 10,
            read: 20,
            write: 30,
        },
        retry: RetryConfig::immediate(10),
    }
}

pub fn make_fs(transport: Arc<FakeTransport>, options: Options) -> GcsFileSystem {
    GcsFileSystem::builder()
        .transport(transport)
        .token_provider(Arc::new(StaticTokenProvider::new("fake_token")))
        .zone_provider(Arc::new(StaticZoneProvider::new("us-east1-b")))
        .options(options)
        .build()
}

pub fn api(path: &str) -> String {
    format!("https://www.googleapis.com/storage/v1{path}")
}

pub fn upload_api(path: &str) -> String {
    format!("https://www.googleapis.com/upload/storage/v1{path}")
}

pub fn media_url(path: &str) -> String {
    format!("https://storage.googleapis.com{path}")
}

/// Metadata-endpoint URI for an (already percent-encoded) object name.
pub fn object_meta(bucket: &str, encoded_name: &str) -> String {
    api(&format!(
        "/b/{bucket}/o/{encoded_name}?fields=size%2Cgeneration%2Cupdated"
    ))
}

/// A metadata response body with the given size and generation.
pub fn stat_body(size: u64, generation: u64) -> String {
    format!(
        "{{\"size\": \"{size}\",\"generation\": \"{generation}\",\
         \"updated\": \"2016-04-29T23:15:24.896Z\"}}"
    )
}
