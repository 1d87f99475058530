// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types

use thiserror::Error;

/// Transport-level failures. All of these are retryable by caller policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    #[error("Call canceled")]
    Canceled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
