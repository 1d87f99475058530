// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for network::endpoint

mod common;

use std::sync::Arc;

use common::*;
use pushline_core::network::{
    Endpoint, MockHttpTransport, MockTransportFactory, OutgoingRequest, RequestDispatcher,
    ServiceEndpoints,
};
use pushline_core::{AuthContext, ConfigError, ServiceConfiguration, ServiceSocket, StaticCredentials};

fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new("alice", 1, "pw"))
}

#[test]
fn test_missing_cdn_two_fails_before_any_transport() {
    let transport = Arc::new(MockHttpTransport::new());
    let factory = MockTransportFactory::new(transport);
    let config = ServiceConfiguration::default()
        .with_service_url(url(SERVICE))
        .with_cdn_url(0, url(CDN0));

    let result = ServiceSocket::with_transport_factory(&config, credentials(), &factory);
    assert!(matches!(result, Err(ConfigError::MissingRequiredCdn(2))));
    assert_eq!(factory.created(), 0);
}

#[test]
fn test_missing_cdn_zero_fails() {
    let transport = Arc::new(MockHttpTransport::new());
    let factory = MockTransportFactory::new(transport);
    let config = ServiceConfiguration::default()
        .with_service_url(url(SERVICE))
        .with_cdn_url(2, url(CDN2));

    assert!(matches!(
        ServiceEndpoints::new(&config, &factory),
        Err(ConfigError::MissingRequiredCdn(0))
    ));
    assert_eq!(factory.created(), 0);
}

#[test]
fn test_pinned_socket_rejects_missing_cdn_without_tls_setup() {
    // An empty trust store would fail TLS setup; validation must come first.
    let config = ServiceConfiguration::default().with_service_url(url(SERVICE));
    assert!(matches!(
        ServiceSocket::new(&config, credentials()),
        Err(ConfigError::MissingRequiredCdn(0))
    ));
}

#[test]
fn test_optional_pools_absent_when_unconfigured() {
    let transport = Arc::new(MockHttpTransport::new());
    let factory = MockTransportFactory::new(transport);
    let config = ServiceConfiguration::default()
        .with_service_url(url(SERVICE))
        .with_cdn_url(0, url(CDN0))
        .with_cdn_url(2, url(CDN2));

    let endpoints = ServiceEndpoints::new(&config, &factory).unwrap();
    assert!(endpoints.contact_discovery.is_none());
    assert!(endpoints.storage.is_none());
    assert_eq!(endpoints.cdn.len(), 2);
    // service endpoints get a second, unidentified transport
    assert_eq!(factory.created(), 4);
}

#[test]
fn test_invalid_url_rejected() {
    let transport: Arc<MockHttpTransport> = Arc::new(MockHttpTransport::new());
    assert!(matches!(
        Endpoint::new(&url("ftp://files.test"), transport.clone()),
        Err(ConfigError::InvalidUrl(_))
    ));
    assert!(matches!(
        Endpoint::new(&url("http://api.pushline.test"), transport.clone()),
        Err(ConfigError::InvalidUrl(_))
    ));
    assert!(matches!(
        Endpoint::new(&url("not a url"), transport),
        Err(ConfigError::InvalidUrl(_))
    ));
}

#[test]
fn test_resolve_relative_and_signed_urls() {
    let transport = Arc::new(MockHttpTransport::new());
    let endpoint = Endpoint::new(&url("https://cdn.test/base/"), transport).unwrap();

    assert_eq!(endpoint.resolve("/v1/x").unwrap(), "https://cdn.test/base/v1/x");
    assert_eq!(
        endpoint.resolve("attachments/").unwrap(),
        "https://cdn.test/base/attachments/"
    );
    assert_eq!(
        endpoint
            .resolve("https://storage.googleapis.com/bucket/obj?sig=abc")
            .unwrap(),
        "https://cdn.test/base/bucket/obj?sig=abc"
    );
}

#[test]
fn test_host_header_override_is_sent() {
    let transport = Arc::new(MockHttpTransport::new());
    let factory = MockTransportFactory::new(transport.clone());
    let config = ServiceConfiguration::default()
        .with_service_url(url("https://10.0.0.1").with_host_header("chat.pushline.test"))
        .with_cdn_url(0, url(CDN0))
        .with_cdn_url(2, url(CDN2));
    let endpoints = ServiceEndpoints::new(&config, &factory).unwrap();

    let dispatcher = RequestDispatcher::default();
    dispatcher
        .dispatch(
            &endpoints.service,
            OutgoingRequest::get("/v1/config").header("Host", "ignored.test"),
            &AuthContext::None,
        )
        .unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.url, "https://10.0.0.1/v1/config");
    let hosts: Vec<_> = request
        .headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("host"))
        .collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].1, "chat.pushline.test");
}

#[test]
fn test_unidentified_calls_use_separate_transport() {
    let identified = Arc::new(MockHttpTransport::new());
    let unidentified = Arc::new(MockHttpTransport::new());
    let endpoint =
        Endpoint::with_unidentified(&url(SERVICE), identified.clone(), unidentified.clone())
            .unwrap();
    let pool = pushline_core::EndpointPool::new("service", vec![endpoint]).unwrap();
    let dispatcher = RequestDispatcher::default();

    dispatcher
        .dispatch(
            &pool,
            OutgoingRequest::get("/v1/profile/x"),
            &AuthContext::UnidentifiedAccessKey(vec![9; 16]),
        )
        .unwrap();
    dispatcher
        .dispatch(&pool, OutgoingRequest::get("/v1/config"), &AuthContext::None)
        .unwrap();

    assert_eq!(unidentified.request_count(), 1);
    assert_eq!(identified.request_count(), 1);
    assert!(unidentified
        .last_request()
        .unwrap()
        .header("Unidentified-Access-Key")
        .is_some());
}
