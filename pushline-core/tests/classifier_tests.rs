// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for network::classify

use pushline_core::network::{validate_cdn_response, validate_service_response};
use pushline_core::{HttpResponse, ServiceError};
use serde_json::json;

fn classify(response: HttpResponse) -> ServiceError {
    validate_service_response(response, None).unwrap_err()
}

#[test]
fn test_mismatched_devices_body_decoded() {
    let response =
        HttpResponse::new(409).with_json(&json!({"missingDevices": [1], "extraDevices": []}));
    match classify(response) {
        ServiceError::ConflictMismatchedDevices(body) => {
            assert_eq!(body.missing_devices, vec![1]);
            assert!(body.extra_devices.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_undecodable_body_degrades_to_generic() {
    let response = HttpResponse::new(409)
        .with_reason("Conflict")
        .with_body(b"<html>".to_vec());
    match classify(response) {
        ServiceError::UnsuccessfulResponse { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "Conflict");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_status_table() {
    assert!(matches!(
        classify(HttpResponse::new(401)),
        ServiceError::AuthorizationFailed { status: 401 }
    ));
    assert!(matches!(
        classify(HttpResponse::new(403)),
        ServiceError::AuthorizationFailed { status: 403 }
    ));
    assert!(matches!(classify(HttpResponse::new(404)), ServiceError::NotFound));
    assert!(matches!(
        classify(HttpResponse::new(413)),
        ServiceError::RateLimited { status: 413, .. }
    ));
    assert!(matches!(
        classify(HttpResponse::new(410).with_json(&json!({"staleDevices": [3]}))),
        ServiceError::StaleDevices(_)
    ));
    assert!(matches!(
        classify(HttpResponse::new(411).with_json(&json!({"current": 5, "max": 5}))),
        ServiceError::DeviceLimitExceeded(_)
    ));
    assert!(matches!(
        classify(HttpResponse::new(417)),
        ServiceError::ExpectationFailed
    ));
    assert!(matches!(
        classify(HttpResponse::new(423).with_json(&json!({"length": 6, "timeRemaining": 1000}))),
        ServiceError::RegistrationLocked(_)
    ));
    assert!(matches!(
        classify(HttpResponse::new(499)),
        ServiceError::DeprecatedVersion
    ));
    assert!(matches!(
        classify(HttpResponse::new(508)),
        ServiceError::ServerRejected
    ));
    assert!(matches!(
        classify(HttpResponse::new(500)),
        ServiceError::UnsuccessfulResponse { status: 500, .. }
    ));
}

#[test]
fn test_proof_required_keeps_retry_after() {
    let response = HttpResponse::new(428)
        .with_header("Retry-After", "10")
        .with_json(&json!({"token": "t", "options": ["recaptcha"]}));
    match classify(response) {
        ServiceError::ProofRequired { proof, retry_after } => {
            assert_eq!(proof.token, "t");
            assert_eq!(retry_after.map(|d| d.as_secs()), Some(10));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_generic_message_format() {
    let err = classify(HttpResponse::new(502).with_reason("Bad Gateway"));
    assert_eq!(err.to_string(), "Bad response: 502 Bad Gateway");
    assert_eq!(err.status(), Some(502));
}

#[test]
fn test_cdn_accepts_any_2xx() {
    assert!(validate_cdn_response(HttpResponse::new(201)).is_ok());
    assert!(matches!(
        validate_cdn_response(HttpResponse::new(403)),
        Err(ServiceError::UnsuccessfulResponse { status: 403, .. })
    ));
}
