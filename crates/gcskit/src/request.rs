//! API request construction.
//!
//! One place knows the store's endpoint shapes: metadata, bucket metadata,
//! listing, media download, resumable-upload initiation/chunk/status-probe,
//! rewrite, and delete. Every request leaves here with the bearer token,
//! the timeout triple for its category, and the optional operator-supplied
//! extra header already attached.

use crate::config::TimeoutConfig;
use crate::http::{Method, Request, RequestTimeouts};
use crate::path::{encode_object_name, ObjectPath};

/// JSON API root.
pub const API_ROOT: &str = "https://www.googleapis.com/storage/v1";
/// Resumable-upload API root.
pub const UPLOAD_ROOT: &str = "https://www.googleapis.com/upload/storage/v1";
/// Direct media host.
pub const MEDIA_ROOT: &str = "https://storage.googleapis.com";

/// Metadata fields requested for object stats.
const STAT_FIELDS: &str = "size%2Cgeneration%2Cupdated";
/// Metadata fields requested for delimited (one-level) listings.
const LIST_FIELDS_DELIMITED: &str = "items%2Fname%2Cprefixes%2CnextPageToken";
/// Metadata fields requested for recursive listings.
const LIST_FIELDS: &str = "items%2Fname%2CnextPageToken";

/// Parameters of one list-objects page request.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    /// Object-name prefix, already `/`-terminated; `None` lists the bucket root.
    pub prefix: Option<String>,
    /// Ask the server to fold one level of hierarchy into `prefixes[]`.
    pub delimited: bool,
    /// Page size cap; `None` leaves the server default.
    pub max_results: Option<u64>,
    /// Continuation token from the previous page.
    pub page_token: Option<String>,
}

/// Builds [`Request`]s for one logical operation.
pub struct RequestBuilder {
    token: String,
    extra_header: Option<(String, String)>,
    timeouts: TimeoutConfig,
}

impl RequestBuilder {
    pub fn new(
        token: String,
        extra_header: Option<(String, String)>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            token,
            extra_header,
            timeouts,
        }
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if !self.token.is_empty() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", self.token)));
        }
        if let Some((name, value)) = &self.extra_header {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    fn metadata_timeouts(&self) -> RequestTimeouts {
        RequestTimeouts {
            connect: self.timeouts.connect,
            idle: self.timeouts.idle,
            operation: self.timeouts.metadata,
        }
    }

    fn request(&self, method: Method, uri: String, timeouts: RequestTimeouts) -> Request {
        Request {
            method,
            uri,
            headers: self.base_headers(),
            range: None,
            body: Vec::new(),
            timeouts,
        }
    }

    /// `GET /b/{bucket}/o/{name}?fields=size,generation,updated`
    pub fn object_metadata(&self, path: &ObjectPath) -> Request {
        let uri = format!(
            "{API_ROOT}/b/{}/o/{}?fields={STAT_FIELDS}",
            path.bucket,
            path.encoded_object()
        );
        self.request(Method::Get, uri, self.metadata_timeouts())
    }

    /// `GET /b/{bucket}` — existence probe and `location` lookup.
    pub fn bucket_metadata(&self, bucket: &str) -> Request {
        let uri = format!("{API_ROOT}/b/{bucket}");
        self.request(Method::Get, uri, self.metadata_timeouts())
    }

    /// `GET /b/{bucket}/o?...` — one page of a listing.
    pub fn list(&self, bucket: &str, args: &ListArgs) -> Request {
        let fields = if args.delimited {
            LIST_FIELDS_DELIMITED
        } else {
            LIST_FIELDS
        };
        let mut uri = format!("{API_ROOT}/b/{bucket}/o?fields={fields}");
        if args.delimited {
            uri.push_str("&delimiter=%2F");
        }
        if let Some(prefix) = &args.prefix {
            uri.push_str("&prefix=");
            uri.push_str(&encode_object_name(prefix));
        }
        if let Some(max) = args.max_results {
            uri.push_str(&format!("&maxResults={max}"));
        }
        if let Some(token) = &args.page_token {
            uri.push_str("&pageToken=");
            uri.push_str(token);
        }
        self.request(Method::Get, uri, self.metadata_timeouts())
    }

    /// Ranged media download; the range is inclusive.
    pub fn media(&self, path: &ObjectPath, start: u64, end: u64) -> Request {
        let uri = format!("{MEDIA_ROOT}/{}/{}", path.bucket, path.encoded_object());
        let mut request = self.request(
            Method::Get,
            uri,
            RequestTimeouts {
                connect: self.timeouts.connect,
                idle: self.timeouts.idle,
                operation: self.timeouts.read,
            },
        );
        request.range = Some((start, end));
        request
    }

    /// `POST .../o?uploadType=resumable&name={name}` — opens an upload
    /// session; the session URI comes back in the `Location` header.
    pub fn upload_init(&self, path: &ObjectPath, total_length: u64) -> Request {
        let uri = format!(
            "{UPLOAD_ROOT}/b/{}/o?uploadType=resumable&name={}",
            path.bucket,
            path.encoded_object()
        );
        let mut request = self.request(Method::Post, uri, self.metadata_timeouts());
        request
            .headers
            .push(("X-Upload-Content-Length".to_string(), total_length.to_string()));
        request
    }

    /// `PUT <session>` with `Content-Range: bytes A-(L-1)/L` and the
    /// remaining payload. A zero-length upload sends no `Content-Range`.
    pub fn upload_chunk(
        &self,
        session_uri: &str,
        body: Vec<u8>,
        start: u64,
        total_length: u64,
    ) -> Request {
        let mut request = self.request(
            Method::Put,
            session_uri.to_string(),
            RequestTimeouts {
                connect: self.timeouts.connect,
                idle: self.timeouts.idle,
                operation: self.timeouts.write,
            },
        );
        if total_length > 0 {
            request.headers.push((
                "Content-Range".to_string(),
                format!("bytes {start}-{}/{total_length}", total_length - 1),
            ));
        }
        request.body = body;
        request
    }

    /// `PUT <session>` with `Content-Range: bytes */L` and an empty body —
    /// asks the server how much of the upload it has committed.
    pub fn upload_status_probe(&self, session_uri: &str, total_length: u64) -> Request {
        let mut request = self.request(
            Method::Put,
            session_uri.to_string(),
            self.metadata_timeouts(),
        );
        request.headers.push((
            "Content-Range".to_string(),
            format!("bytes */{total_length}"),
        ));
        request
    }

    /// `POST .../o/{src}/rewriteTo/b/{bucket}/o/{dst}` — server-side copy.
    pub fn rewrite(&self, src: &ObjectPath, dst: &ObjectPath) -> Request {
        let uri = format!(
            "{API_ROOT}/b/{}/o/{}/rewriteTo/b/{}/o/{}",
            src.bucket,
            src.encoded_object(),
            dst.bucket,
            dst.encoded_object()
        );
        self.request(Method::Post, uri, self.metadata_timeouts())
    }

    /// `DELETE /b/{bucket}/o/{name}`
    pub fn delete(&self, path: &ObjectPath) -> Request {
        let uri = format!("{API_ROOT}/b/{}/o/{}", path.bucket, path.encoded_object());
        self.request(Method::Delete, uri, self.metadata_timeouts())
    }
}
