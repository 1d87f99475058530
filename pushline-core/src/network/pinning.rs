// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Certificate Pinning
//!
//! Builds TLS client configurations whose only trust anchors are the roots
//! of a configured [`TrustStore`]. Chains that do not validate against those
//! roots fail the handshake; the platform trust store is never consulted.

use std::sync::Arc;

use rustls::crypto::ring::{cipher_suite, default_provider};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};

use crate::config::{ConfigError, TlsPolicy, TrustStore};

/// Cipher suites allowed by a policy.
pub fn cipher_suites(policy: TlsPolicy) -> Vec<SupportedCipherSuite> {
    let mut suites = vec![
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS13_AES_128_GCM_SHA256,
        cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
    ];
    if policy == TlsPolicy::Restricted {
        suites.extend([
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ]);
    }
    suites
}

static RESTRICTED_VERSIONS: [&SupportedProtocolVersion; 2] =
    [&rustls::version::TLS13, &rustls::version::TLS12];
static MODERN_VERSIONS: [&SupportedProtocolVersion; 1] = [&rustls::version::TLS13];

fn protocol_versions(policy: TlsPolicy) -> &'static [&'static SupportedProtocolVersion] {
    match policy {
        TlsPolicy::Restricted => &RESTRICTED_VERSIONS,
        TlsPolicy::Modern => &MODERN_VERSIONS,
    }
}

/// Root store containing exactly the certificates of `trust_store`.
pub fn root_store(trust_store: &TrustStore) -> Result<RootCertStore, ConfigError> {
    let mut roots = RootCertStore::empty();
    for der in trust_store.certificates() {
        roots
            .add(CertificateDer::from(der.clone()))
            .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    }
    Ok(roots)
}

/// Builds a pinned client configuration.
pub fn pinned_client_config(
    label: &str,
    trust_store: &TrustStore,
    policy: TlsPolicy,
) -> Result<ClientConfig, ConfigError> {
    if trust_store.is_empty() {
        return Err(ConfigError::EmptyTrustStore(label.to_string()));
    }
    let roots = root_store(trust_store)?;

    let provider = CryptoProvider {
        cipher_suites: cipher_suites(policy),
        ..default_provider()
    };

    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(protocol_versions(policy))
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}
