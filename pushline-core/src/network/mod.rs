// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Layer
//!
//! Connection management for every logical service the client talks to.
//!
//! # Architecture
//!
//! - **Transport trait**: one blocking HTTP exchange ([`HttpTransport`])
//! - **Pinning**: rustls configurations rooted only in configured trust stores
//! - **Endpoints**: one transport per configured URL, grouped into pools
//! - **Dispatcher**: random endpoint choice, auth headers, timeouts,
//!   in-flight registration
//! - **Classifier**: HTTP status to [`crate::ServiceError`]
//!
//! # Example
//!
//! ```ignore
//! use pushline_core::network::{MockHttpTransport, MockTransportFactory, ServiceEndpoints};
//!
//! let transport = Arc::new(MockHttpTransport::new());
//! let factory = MockTransportFactory::new(transport.clone());
//! let endpoints = ServiceEndpoints::new(&config, &factory)?;
//! ```

pub mod classify;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod in_flight;
pub mod mock;
pub mod pinning;
pub mod transport;

pub use classify::{
    retry_after, validate_cdn_response, validate_enclave_response, validate_service_response,
    validate_storage_response, ResponseHandler, SUCCESS_STATUSES,
};
pub use dispatcher::{OutgoingRequest, RequestDispatcher, DEFAULT_TIMEOUT};
pub use endpoint::{
    Endpoint, EndpointPool, PinnedTransportFactory, ServiceEndpoints, TransportFactory,
};
pub use error::NetworkError;
pub use http::ReqwestTransport;
pub use in_flight::{CallGuard, CallHandle, CancelableReader, InFlightCalls, UploadCanceled};
pub use mock::{MockHttpTransport, MockTransportFactory, RecordedRequest};
pub use pinning::pinned_client_config;
pub use transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, Interceptor, Method, MultipartForm,
    RequestBody, StaticHeaderInterceptor, TransportResult,
};
