// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Attestation report signature checks.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256};
use serde::Deserialize;
use serde_with::base64::Base64;
use serde_with::serde_as;

use super::quote::{Quote, QUOTE_BODY_LEN};
use super::AttestationError;

/// Report version this client understands.
pub const SIGNATURE_BODY_VERSION: u64 = 3;

/// How long an attestation report stays acceptable.
pub fn report_validity() -> Duration {
    Duration::days(1)
}

/// Verifies the report-signing service's signature over a signature body.
pub trait QuoteSignatureVerifier: Send + Sync {
    fn verify(
        &self,
        certificates: &str,
        signature_body: &[u8],
        signature: &[u8],
    ) -> Result<(), AttestationError>;
}

/// RSA PKCS#1 v1.5 SHA-256 verification against pinned report-signing keys.
///
/// Keys are DER-encoded `RSAPublicKey` structures.
#[derive(Debug, Clone)]
pub struct RsaSignatureVerifier {
    keys: Vec<Vec<u8>>,
}

impl RsaSignatureVerifier {
    pub fn new(keys: Vec<Vec<u8>>) -> Self {
        RsaSignatureVerifier { keys }
    }
}

impl QuoteSignatureVerifier for RsaSignatureVerifier {
    fn verify(
        &self,
        certificates: &str,
        signature_body: &[u8],
        signature: &[u8],
    ) -> Result<(), AttestationError> {
        if certificates.trim().is_empty() {
            return Err(AttestationError::MissingCertificates);
        }
        let trusted = self.keys.iter().any(|key| {
            UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, key)
                .verify(signature_body, signature)
                .is_ok()
        });
        if trusted {
            Ok(())
        } else {
            Err(AttestationError::SignatureVerification)
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureBody {
    #[serde_as(as = "Base64")]
    isv_enclave_quote_body: Vec<u8>,
    isv_enclave_quote_status: String,
    version: u64,
    timestamp: String,
}

fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, AttestationError> {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.and_utc())
        .map_err(|e| AttestationError::InvalidSignatureBody(format!("timestamp: {}", e)))
}

/// Checks the signed report against the quote it vouches for.
pub fn verify_signature_body(
    verifier: &dyn QuoteSignatureVerifier,
    signature_body: &str,
    signature: &[u8],
    certificates: &str,
    quote: &Quote,
    now: DateTime<Utc>,
) -> Result<(), AttestationError> {
    verifier.verify(certificates, signature_body.as_bytes(), signature)?;

    let body: SignatureBody = serde_json::from_str(signature_body)
        .map_err(|e| AttestationError::InvalidSignatureBody(e.to_string()))?;

    if body.version != SIGNATURE_BODY_VERSION {
        return Err(AttestationError::InvalidSignatureBody(format!(
            "unexpected version {}",
            body.version
        )));
    }

    let reported = body.isv_enclave_quote_body.get(..QUOTE_BODY_LEN);
    if reported != Some(quote.body()) {
        return Err(AttestationError::QuoteBodyMismatch);
    }

    if body.isv_enclave_quote_status != "OK" {
        return Err(AttestationError::UntrustedQuoteStatus(
            body.isv_enclave_quote_status,
        ));
    }

    let issued = parse_timestamp(&body.timestamp)?;
    if issued + report_validity() < now {
        return Err(AttestationError::ReportExpired);
    }

    Ok(())
}
