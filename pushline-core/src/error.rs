// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Service Error Taxonomy
//!
//! One closed error type for every service call. Callers match on the
//! variant; structured server bodies are decoded into the variant's data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attestation::AttestationError;
use crate::config::ConfigError;
use crate::network::NetworkError;

/// Result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Body of a 409 response: the recipient's device list differs from ours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MismatchedDevices {
    pub missing_devices: Vec<u32>,
    pub extra_devices: Vec<u32>,
}

/// Body of a 410 response: sessions with these devices are stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaleDevices {
    pub stale_devices: Vec<u32>,
}

/// Body of a 411 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceLimit {
    pub current: u32,
    pub max: u32,
}

/// Credentials the server hands back alongside a registration lock.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of a 423 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationLockFailure {
    /// Lock duration in milliseconds.
    pub length: u64,
    /// Remaining lock time in milliseconds.
    pub time_remaining: u64,
    pub backup_credentials: Option<AuthCredentials>,
}

/// Body of a 428 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofRequired {
    pub token: String,
    pub options: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Authorization failed ({status})")]
    AuthorizationFailed { status: u16 },

    #[error("Not found")]
    NotFound,

    #[error("Rate limit exceeded ({status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("Mismatched devices: {0:?}")]
    ConflictMismatchedDevices(MismatchedDevices),

    #[error("Stale devices: {0:?}")]
    StaleDevices(StaleDevices),

    #[error("Device limit exceeded: {}/{}", .0.current, .0.max)]
    DeviceLimitExceeded(DeviceLimit),

    #[error("Expectation failed")]
    ExpectationFailed,

    #[error("Registration locked ({} ms remaining)", .0.time_remaining)]
    RegistrationLocked(RegistrationLockFailure),

    #[error("Proof required")]
    ProofRequired {
        proof: ProofRequired,
        retry_after: Option<Duration>,
    },

    #[error("Client version is deprecated")]
    DeprecatedVersion,

    #[error("Server rejected the request")]
    ServerRejected,

    #[error("Resume location is no longer valid")]
    ResumeLocationInvalid,

    #[error("Attestation failed: {0}")]
    AttestationFailed(#[from] AttestationError),

    #[error("Attestation expired")]
    AttestationExpired,

    #[error("Unregistered user: {0}")]
    UnregisteredUser(String),

    #[error("Storage conflict")]
    StorageConflict(Vec<u8>),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Bad response: {status} {message}")]
    UnsuccessfulResponse { status: u16, message: String },
}

impl ServiceError {
    /// True for failures a caller may blindly retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Network(_) | ServiceError::RateLimited { .. }
        )
    }

    /// HTTP status behind the error, where one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::AuthorizationFailed { status }
            | ServiceError::RateLimited { status, .. }
            | ServiceError::UnsuccessfulResponse { status, .. } => Some(*status),
            ServiceError::NotFound | ServiceError::UnregisteredUser(_) => Some(404),
            ServiceError::ConflictMismatchedDevices(_)
            | ServiceError::AttestationExpired
            | ServiceError::StorageConflict(_) => Some(409),
            ServiceError::StaleDevices(_) => Some(410),
            ServiceError::DeviceLimitExceeded(_) => Some(411),
            ServiceError::ExpectationFailed => Some(417),
            ServiceError::RegistrationLocked(_) => Some(423),
            ServiceError::ProofRequired { .. } => Some(428),
            ServiceError::DeprecatedVersion => Some(499),
            ServiceError::ServerRejected => Some(508),
            ServiceError::Network(_)
            | ServiceError::ResumeLocationInvalid
            | ServiceError::AttestationFailed(_)
            | ServiceError::MalformedResponse(_)
            | ServiceError::MissingConfiguration(_) => None,
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::MissingConfiguration(err.to_string())
    }
}
