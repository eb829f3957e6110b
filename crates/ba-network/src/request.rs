use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies an in-flight request (spec §4.7: "a condition variable keyed
/// by a pointer identifier"). A monotonic counter stands in for the
/// original's pointer identity — both are just unique, comparable tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    pub(crate) fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn bits(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// One named part of a multipart/form-data body (spec §6 "multipart form
/// parts"). `file_name` is set for parts meant to be uploaded as a file
/// attachment rather than a plain form field.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: value.into().into_bytes(),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Present only for multipart/form-data submissions; when non-empty,
    /// `body` is ignored and the parts are encoded as the request body
    /// instead (spec §6).
    pub multipart: Vec<MultipartPart>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            multipart: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::new(),
            body,
            multipart: Vec::new(),
        }
    }

    /// Builds a multipart POST. `parts` becomes the entire body; any bytes
    /// passed to `post` are not used alongside this.
    pub fn post_multipart(url: impl Into<String>, parts: Vec<MultipartPart>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            multipart: parts,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Response delivered to the completion callback (spec §4.7: "transport
/// errors and HTTP 4xx/5xx both set `response.success=false`").
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub success: bool,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub(crate) fn transport_failure() -> Self {
        Self {
            success: false,
            status_code: 0,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send>;
pub type ResponseCallback = Box<dyn FnOnce(HttpResponse) + Send>;
