// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pushline Core Library
//!
//! Client-side protocol layer for the Pushline messaging service: account,
//! key, message, profile, storage, CDN and enclave endpoints.
//! All cryptographic operations use the audited `ring` crate, except X25519
//! key agreement (`x25519-dalek`).

pub mod attestation;
pub mod config;
pub mod credentials;
pub mod error;
pub mod network;
pub mod service;
pub mod upload;

pub use attestation::{AttestationError, AttestationSession, QuoteSignatureVerifier};
pub use config::{
    CdnUrlMap, ConfigError, ProxyConfig, ServiceConfiguration, ServiceUrl, TlsPolicy, TrustStore,
};
pub use credentials::{AuthContext, CredentialsProvider, StaticCredentials, UnidentifiedAccess};
pub use error::{ServiceError, ServiceResult};
pub use network::{
    EndpointPool, HttpResponse, HttpTransport, InFlightCalls, MockHttpTransport, NetworkError,
    RequestDispatcher,
};
pub use service::{Clock, EnclaveService, ServiceSocket, SystemClock};
pub use upload::{AttachmentDigest, AttachmentUpload, ResumableUploadSpec};
