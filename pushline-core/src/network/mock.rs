// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Transport
//!
//! Scripted transport for testing without network I/O. Records every request
//! (streamed bodies are read to the end, so digests and progress run exactly
//! as they do on the wire) and replays queued responses.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::endpoint::TransportFactory;
use super::error::NetworkError;
use super::in_flight::{CallHandle, CancelableReader, UploadCanceled};
use super::transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportResult,
};
use crate::config::{ConfigError, ServiceUrl};

/// A request as seen by [`MockHttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Multipart parts as `(name, bytes)`, in order.
    pub form: Vec<(String, Vec<u8>)>,
}

impl RecordedRequest {
    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of a multipart part, if present.
    pub fn form_field(&self, name: &str) -> Option<&[u8]> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }
}

type Responder = Box<dyn Fn(&RecordedRequest) -> TransportResult<HttpResponse> + Send + Sync>;

/// Scripted transport double.
///
/// Responses come from, in order: the queue, the responder, a default
/// `200 OK` with an empty body.
#[derive(Default)]
pub struct MockHttpTransport {
    queue: Mutex<VecDeque<TransportResult<HttpResponse>>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        MockHttpTransport::default()
    }

    /// Queues a response for the next call.
    pub fn queue_response(&self, response: HttpResponse) {
        self.queue
            .lock()
            .expect("mutex poisoned")
            .push_back(Ok(response));
    }

    /// Queues a transport failure for the next call.
    pub fn queue_error(&self, error: NetworkError) {
        self.queue
            .lock()
            .expect("mutex poisoned")
            .push_back(Err(error));
    }

    /// Answers calls the queue does not cover.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&RecordedRequest) -> TransportResult<HttpResponse> + Send + Sync + 'static,
    {
        *self.responder.lock().expect("mutex poisoned") = Some(Box::new(responder));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("mutex poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("mutex poisoned").len()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().expect("mutex poisoned").last().cloned()
    }

    fn drain(reader: Box<dyn Read + Send>, call: &CallHandle) -> TransportResult<Vec<u8>> {
        let mut reader = CancelableReader::new(reader, call.clone());
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Ok(out),
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(e) if UploadCanceled::is_in_chain(&e) => return Err(NetworkError::Canceled),
                Err(e) => return Err(NetworkError::Interrupted(e.to_string())),
            }
        }
    }
}

impl HttpTransport for MockHttpTransport {
    fn execute(&self, request: HttpRequest, call: &CallHandle) -> TransportResult<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;

        let mut recorded = RecordedRequest {
            method,
            url,
            headers,
            content_type: None,
            body: Vec::new(),
            form: Vec::new(),
        };

        let streamed = match body {
            RequestBody::Empty => Ok(()),
            RequestBody::Bytes { content_type, data } => {
                recorded.content_type = Some(content_type);
                recorded.body = data;
                Ok(())
            }
            RequestBody::Stream {
                content_type,
                reader,
                ..
            } => {
                recorded.content_type = Some(content_type);
                Self::drain(reader, call).map(|data| recorded.body = data)
            }
            RequestBody::Multipart(form) => {
                recorded.content_type = Some("multipart/form-data".to_string());
                let mut result = Ok(());
                for part in form.parts {
                    match part {
                        FormPart::Text { name, value } => {
                            recorded.form.push((name, value.into_bytes()))
                        }
                        FormPart::Stream { name, reader, .. } => match Self::drain(reader, call) {
                            Ok(data) => recorded.form.push((name, data)),
                            Err(e) => {
                                result = Err(e);
                                break;
                            }
                        },
                    }
                }
                result
            }
        };

        self.requests
            .lock()
            .expect("mutex poisoned")
            .push(recorded.clone());
        streamed?;

        if let Some(queued) = self.queue.lock().expect("mutex poisoned").pop_front() {
            return queued;
        }
        if let Some(responder) = self.responder.lock().expect("mutex poisoned").as_ref() {
            return responder(&recorded);
        }
        Ok(HttpResponse::new(200).with_reason("OK"))
    }
}

/// Hands out one shared [`MockHttpTransport`] for every endpoint.
pub struct MockTransportFactory {
    transport: Arc<MockHttpTransport>,
    created: AtomicUsize,
}

impl MockTransportFactory {
    pub fn new(transport: Arc<MockHttpTransport>) -> Self {
        MockTransportFactory {
            transport,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of transports handed out.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, _url: &ServiceUrl) -> Result<Arc<dyn HttpTransport>, ConfigError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}
