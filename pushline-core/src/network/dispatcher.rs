// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Request Dispatcher
//!
//! Turns a logical request into one HTTP exchange on a randomly chosen
//! endpoint of a pool: header assembly, per-call timeout, in-flight
//! registration and transport error wrapping. Status codes are not
//! interpreted here; see [`super::classify`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::endpoint::EndpointPool;
use super::error::NetworkError;
use super::in_flight::InFlightCalls;
use super::transport::{HttpRequest, HttpResponse, Method, RequestBody};
use crate::credentials::AuthContext;
use crate::error::ServiceResult;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request addressed to a pool rather than a concrete URL.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Path relative to the endpoint base, or an absolute signed URL.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutgoingRequest {
    pub fn new(method: Method, path: &str) -> Self {
        OutgoingRequest {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Issues requests and tracks them for bulk cancellation.
#[derive(Debug)]
pub struct RequestDispatcher {
    in_flight: Arc<InFlightCalls>,
    timeout_millis: AtomicU64,
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RequestDispatcher {
    pub fn new(timeout: Duration) -> Self {
        RequestDispatcher {
            in_flight: Arc::new(InFlightCalls::new()),
            timeout_millis: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    /// Changes the per-call timeout for calls dispatched from now on.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_millis
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis.load(Ordering::SeqCst))
    }

    /// The registry of calls currently on the wire.
    pub fn in_flight(&self) -> &Arc<InFlightCalls> {
        &self.in_flight
    }

    /// Cancels every call currently on the wire. Returns how many.
    pub fn cancel_in_flight_requests(&self) -> usize {
        self.in_flight.cancel_all()
    }

    /// Sends `request` to a random endpoint of `pool`.
    ///
    /// Header order: caller headers, then auth (skipped entirely when the
    /// caller already set `Authorization`), then the endpoint's `Host`
    /// override.
    pub fn dispatch(
        &self,
        pool: &EndpointPool,
        request: OutgoingRequest,
        auth: &AuthContext,
    ) -> ServiceResult<HttpResponse> {
        let endpoint = pool.pick();
        let url = endpoint
            .resolve(&request.path)
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let caller_authorized = request.has_header("Authorization");
        let OutgoingRequest {
            method,
            mut headers,
            body,
            ..
        } = request;

        if !caller_authorized {
            headers.extend(auth.headers());
        }

        let mut http_request = HttpRequest {
            method,
            url,
            headers,
            body,
            timeout: self.timeout(),
        };
        if let Some(host) = endpoint.host_header() {
            http_request.set_header("Host", host);
        }

        debug!(
            method = %http_request.method,
            endpoint = endpoint.base_url(),
            "dispatching request"
        );

        let guard = self.in_flight.register();
        let transport = endpoint.transport(auth.is_unidentified());
        let result = transport.execute(http_request, guard.handle());
        let canceled = guard.handle().is_canceled();
        drop(guard);

        match result {
            Ok(_) if canceled => Err(NetworkError::Canceled.into()),
            Ok(response) => Ok(response),
            Err(e) => Err(e.into()),
        }
    }
}
