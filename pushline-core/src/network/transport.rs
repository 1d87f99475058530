// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP Transport Trait
//!
//! Platform-agnostic abstraction over a single blocking HTTP exchange.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::error::NetworkError;
use super::in_flight::CallHandle;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multipart form.
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    Stream {
        name: String,
        file_name: String,
        content_type: String,
        length: u64,
        reader: Box<dyn Read + Send>,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::Stream { name, .. } => name,
        }
    }
}

/// Ordered multipart form.
#[derive(Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        MultipartForm::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(FormPart::Text {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn stream(
        mut self,
        name: &str,
        file_name: &str,
        content_type: &str,
        length: u64,
        reader: Box<dyn Read + Send>,
    ) -> Self {
        self.parts.push(FormPart::Stream {
            name: name.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            length,
            reader,
        });
        self
    }
}

/// Request body.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
    /// Streamed body of a known length.
    Stream {
        content_type: String,
        length: u64,
        reader: Box<dyn Read + Send>,
    },
    Multipart(MultipartForm),
}

impl RequestBody {
    /// JSON body.
    pub fn json(data: Vec<u8>) -> Self {
        RequestBody::Bytes {
            content_type: "application/json".to_string(),
            data,
        }
    }

    /// Opaque protobuf body.
    pub fn protobuf(data: Vec<u8>) -> Self {
        RequestBody::Bytes {
            content_type: "application/x-protobuf".to_string(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes { content_type, data } => {
                write!(f, "Bytes({}, {} bytes)", content_type, data.len())
            }
            RequestBody::Stream {
                content_type,
                length,
                ..
            } => write!(f, "Stream({}, {} bytes)", content_type, length),
            RequestBody::Multipart(form) => write!(f, "Multipart({} parts)", form.parts.len()),
        }
    }
}

/// A fully resolved request, ready for a transport.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl HttpRequest {
    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces any existing values of `name`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// A received response with its body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        HttpResponse {
            status,
            reason: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        let body = value.to_string();
        self.with_header("Content-Type", "application/json")
            .with_body(body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header (case-insensitive), in order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP transport.
///
/// Implementations must poll `call` while streaming the request body and
/// abort with [`NetworkError::Canceled`] once it is canceled.
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: HttpRequest, call: &CallHandle) -> TransportResult<HttpResponse>;
}

/// Mutates every outgoing request before it reaches the wire.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, request: &mut HttpRequest);
}

/// Interceptor that adds a fixed header.
pub struct StaticHeaderInterceptor {
    name: String,
    value: String,
}

impl StaticHeaderInterceptor {
    pub fn new(name: &str, value: &str) -> Self {
        StaticHeaderInterceptor {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl Interceptor for StaticHeaderInterceptor {
    fn intercept(&self, request: &mut HttpRequest) {
        if request.header(&self.name).is_none() {
            request.headers.push((self.name.clone(), self.value.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_headers_case_insensitive() {
        let response = HttpResponse::new(200)
            .with_header("Set-Cookie", "a=1; Path=/")
            .with_header("set-cookie", "b=2");
        assert_eq!(response.header("SET-COOKIE"), Some("a=1; Path=/"));
        assert_eq!(response.header_values("set-cookie").len(), 2);
    }

    #[test]
    fn test_set_header_replaces() {
        let mut request = HttpRequest {
            method: Method::Get,
            url: "https://example.test".into(),
            headers: vec![("host".into(), "a".into())],
            body: RequestBody::Empty,
            timeout: Duration::from_secs(1),
        };
        request.set_header("Host", "b");
        assert_eq!(request.headers, vec![("Host".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_static_header_interceptor_keeps_existing() {
        let mut request = HttpRequest {
            method: Method::Get,
            url: "https://example.test".into(),
            headers: vec![("X-Test".into(), "caller".into())],
            body: RequestBody::Empty,
            timeout: Duration::from_secs(1),
        };
        StaticHeaderInterceptor::new("X-Test", "interceptor").intercept(&mut request);
        assert_eq!(request.header("x-test"), Some("caller"));
    }
}
