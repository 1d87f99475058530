// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote Attestation
//!
//! Handshake with a secure enclave (contact discovery, key backup):
//!
//! 1. Generate a fresh ephemeral key pair.
//! 2. Send its public half to the enclave's attestation endpoint and keep
//!    the returned session cookies.
//! 3. For every returned record: derive session keys, validate the quote
//!    and its measurement, verify the signed report, decrypt the request id.
//!
//! Any failure aborts the whole attempt. A multi-enclave handshake yields
//! either every session or none.

pub mod keys;
pub mod quote;
pub mod session;
pub mod signature;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;
use tracing::warn;

use crate::credentials::AuthContext;
use crate::error::{ServiceError, ServiceResult};
use crate::network::{
    validate_enclave_response, EndpointPool, HttpResponse, OutgoingRequest, RequestBody,
    RequestDispatcher,
};

pub use keys::{EphemeralKeyPair, RemoteAttestationKeys};
pub use quote::Quote;
pub use session::{AttestationSession, SealedRequest};
pub use signature::{verify_signature_body, QuoteSignatureVerifier, RsaSignatureVerifier};

/// Upper bound on enclaves in one multi-enclave response.
pub const MAX_ENCLAVE_RECORDS: usize = 3;

/// Attestation failures. None of these is retried in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    #[error("Expected 1 to 3 attestation records, got {0}")]
    InvalidRecordCount(usize),

    #[error("Invalid {0} public key")]
    InvalidKey(&'static str),

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    #[error("Invalid enclave measurement: {0}")]
    InvalidMrenclave(String),

    #[error("Quote measurement does not match the expected enclave")]
    MrenclaveMismatch,

    #[error("Quote report data does not match the server static key")]
    StaticKeyMismatch,

    #[error("Debug enclaves are not trusted")]
    DebugEnclave,

    #[error("Invalid signature body: {0}")]
    InvalidSignatureBody(String),

    #[error("Signed report does not match the quote")]
    QuoteBodyMismatch,

    #[error("Quote status is not trusted: {0}")]
    UntrustedQuoteStatus(String),

    #[error("Attestation report expired")]
    ReportExpired,

    #[error("No report certificates")]
    MissingCertificates,

    #[error("Report signature verification failed")]
    SignatureVerification,

    #[error("Malformed attestation response: {0}")]
    MalformedResponse(String),

    #[error("Cryptographic failure: {0}")]
    Crypto(&'static str),
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttestationRequest {
    #[serde_as(as = "Base64")]
    pub client_public: Vec<u8>,
}

/// One enclave's answer to the handshake.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttestationResponse {
    #[serde_as(as = "Base64")]
    pub server_ephemeral_public: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub server_static_public: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub quote: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub iv: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub tag: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
    pub certificates: String,
    pub signature_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRemoteAttestationResponse {
    pub attestations: BTreeMap<String, RemoteAttestationResponse>,
}

/// Expected enclave plus the trust anchors to check it against.
pub struct AttestationTarget<'a> {
    /// Enclave name used in the attestation path.
    pub enclave_name: &'a str,
    /// Hex-encoded expected measurement.
    pub mrenclave: &'a str,
    /// Value of the `Authorization` header for the handshake.
    pub authorization: &'a str,
    pub verifier: &'a dyn QuoteSignatureVerifier,
    pub now: DateTime<Utc>,
}

impl AttestationTarget<'_> {
    fn expected_mrenclave(&self) -> Result<[u8; 32], AttestationError> {
        let bytes = hex::decode(self.mrenclave)
            .map_err(|e| AttestationError::InvalidMrenclave(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| AttestationError::InvalidMrenclave("expected 32 bytes".to_string()))
    }
}

/// Validates one record and returns the session keys and request id.
pub fn validate_record(
    keys: &EphemeralKeyPair,
    response: &RemoteAttestationResponse,
    target: &AttestationTarget<'_>,
) -> Result<(RemoteAttestationKeys, Vec<u8>), AttestationError> {
    let session_keys = RemoteAttestationKeys::derive(
        keys,
        &response.server_ephemeral_public,
        &response.server_static_public,
    )?;

    let quote = Quote::parse(&response.quote)?;
    if quote.mrenclave != target.expected_mrenclave()? {
        return Err(AttestationError::MrenclaveMismatch);
    }
    if quote.report_data[..32] != response.server_static_public[..] {
        return Err(AttestationError::StaticKeyMismatch);
    }
    if quote.is_debug() {
        return Err(AttestationError::DebugEnclave);
    }

    verify_signature_body(
        target.verifier,
        &response.signature_body,
        &response.signature,
        &response.certificates,
        &quote,
        target.now,
    )?;

    let request_id = session::open_with(
        session_keys.server_key(),
        &response.iv,
        &response.ciphertext,
        &response.tag,
        &[],
    )?;

    Ok((session_keys, request_id))
}

/// Session cookies from `Set-Cookie` headers, attributes stripped.
pub fn session_cookies(response: &HttpResponse) -> Vec<String> {
    response
        .header_values("Set-Cookie")
        .into_iter()
        .filter_map(|value| value.split(';').next())
        .map(|cookie| cookie.trim().to_string())
        .filter(|cookie| !cookie.is_empty())
        .collect()
}

fn exchange(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    keys: &EphemeralKeyPair,
    target: &AttestationTarget<'_>,
) -> ServiceResult<HttpResponse> {
    let body = serde_json::to_vec(&RemoteAttestationRequest {
        client_public: keys.public_key().to_vec(),
    })
    .map_err(|e| AttestationError::MalformedResponse(e.to_string()))?;

    let request = OutgoingRequest::put(&format!("/v1/attestation/{}", target.enclave_name))
        .body(RequestBody::json(body));
    let auth = AuthContext::EnclaveToken {
        authorization: target.authorization.to_string(),
        cookies: Vec::new(),
    };
    validate_enclave_response(dispatcher.dispatch(pool, request, &auth)?)
}

fn log_failure<T>(
    result: Result<T, AttestationError>,
    enclave: &str,
) -> Result<T, AttestationError> {
    if let Err(e) = &result {
        warn!(enclave, error = %e, "attestation failed");
    }
    result
}

/// Attests a single enclave.
pub fn attest(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    target: &AttestationTarget<'_>,
) -> ServiceResult<AttestationSession> {
    let keys = EphemeralKeyPair::generate();
    let response = exchange(dispatcher, pool, &keys, target)?;
    let cookies = session_cookies(&response);

    let record: RemoteAttestationResponse = log_failure(
        response
            .json()
            .map_err(|e| AttestationError::MalformedResponse(e.to_string())),
        target.enclave_name,
    )?;
    let (session_keys, request_id) =
        log_failure(validate_record(&keys, &record, target), target.enclave_name)?;

    Ok(AttestationSession::new(request_id, session_keys, cookies))
}

/// Attests every enclave replica in a multi-enclave response.
///
/// All records must validate; the result is never a partial map.
pub fn attest_multi(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    target: &AttestationTarget<'_>,
) -> ServiceResult<BTreeMap<String, AttestationSession>> {
    let keys = EphemeralKeyPair::generate();
    let response = exchange(dispatcher, pool, &keys, target)?;
    let cookies = session_cookies(&response);

    let multi: MultiRemoteAttestationResponse = log_failure(
        response
            .json()
            .map_err(|e| AttestationError::MalformedResponse(e.to_string())),
        target.enclave_name,
    )?;
    log_failure(
        validate_multi(&keys, &multi, target, &cookies),
        target.enclave_name,
    )
    .map_err(ServiceError::from)
}

/// Validates every record of a multi-enclave response.
pub fn validate_multi(
    keys: &EphemeralKeyPair,
    multi: &MultiRemoteAttestationResponse,
    target: &AttestationTarget<'_>,
    cookies: &[String],
) -> Result<BTreeMap<String, AttestationSession>, AttestationError> {
    let count = multi.attestations.len();
    if !(1..=MAX_ENCLAVE_RECORDS).contains(&count) {
        return Err(AttestationError::InvalidRecordCount(count));
    }

    let mut sessions = BTreeMap::new();
    for (id, record) in &multi.attestations {
        let (session_keys, request_id) = validate_record(keys, record, target)?;
        sessions.insert(
            id.clone(),
            AttestationSession::new(request_id, session_keys, cookies.to_vec()),
        );
    }
    Ok(sessions)
}
