// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Credentials and per-request authentication.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Device id of the primary device.
pub const DEFAULT_DEVICE_ID: u32 = 1;

/// Supplies the account credentials used for basic authentication.
///
/// Implementations may rotate the password between calls; the dispatcher
/// reads it fresh for every request.
pub trait CredentialsProvider: Send + Sync {
    /// Account identifier (e.g. the account UUID).
    fn identifier(&self) -> String;

    fn device_id(&self) -> u32;

    fn password(&self) -> String;

    /// Login name for basic authentication.
    ///
    /// The primary device authenticates with the bare identifier, linked
    /// devices append `.<device_id>`.
    fn login(&self) -> String {
        if self.device_id() == DEFAULT_DEVICE_ID {
            self.identifier()
        } else {
            format!("{}.{}", self.identifier(), self.device_id())
        }
    }

    /// Builds the `Authorization` header value for basic authentication.
    fn basic_authorization(&self) -> String {
        basic_header(&self.login(), &self.password())
    }
}

/// Formats a basic-auth header value.
pub fn basic_header(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
}

/// Fixed credentials.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StaticCredentials {
    identifier: String,
    #[zeroize(skip)]
    device_id: u32,
    password: String,
}

impl StaticCredentials {
    pub fn new(identifier: &str, device_id: u32, password: &str) -> Self {
        StaticCredentials {
            identifier: identifier.to_string(),
            device_id,
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("identifier", &self.identifier)
            .field("device_id", &self.device_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl CredentialsProvider for StaticCredentials {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn password(&self) -> String {
        self.password.clone()
    }
}

/// Capability allowing a request without revealing the sender's identity.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UnidentifiedAccess {
    access_key: Vec<u8>,
}

impl UnidentifiedAccess {
    pub fn new(access_key: Vec<u8>) -> Self {
        UnidentifiedAccess { access_key }
    }

    pub fn access_key(&self) -> &[u8] {
        &self.access_key
    }
}

impl std::fmt::Debug for UnidentifiedAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UnidentifiedAccess([REDACTED])")
    }
}

/// Authentication attached to a single request.
///
/// Chosen by the caller per request and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// No authentication.
    None,
    /// Basic authentication with the given credentials.
    Basic { identifier: String, password: String },
    /// Sealed-sender style access key, sent instead of account credentials.
    UnidentifiedAccessKey(Vec<u8>),
    /// Enclave authorization plus the cookies of the attestation exchange.
    EnclaveToken {
        authorization: String,
        cookies: Vec<String>,
    },
    /// Pre-built `Authorization` header value (storage credentials).
    Authorization(String),
}

impl AuthContext {
    /// Basic auth for the account described by `credentials`.
    pub fn from_credentials(credentials: &dyn CredentialsProvider) -> Self {
        AuthContext::Basic {
            identifier: credentials.login(),
            password: credentials.password(),
        }
    }

    /// Unidentified access if available, otherwise `fallback`.
    pub fn unidentified_or(access: Option<&UnidentifiedAccess>, fallback: AuthContext) -> Self {
        match access {
            Some(access) => AuthContext::UnidentifiedAccessKey(access.access_key().to_vec()),
            None => fallback,
        }
    }

    /// True when the request must use the unidentified transport.
    pub fn is_unidentified(&self) -> bool {
        matches!(self, AuthContext::UnidentifiedAccessKey(_))
    }

    /// Headers this context contributes, in order.
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            AuthContext::None => Vec::new(),
            AuthContext::Basic {
                identifier,
                password,
            } => vec![(
                "Authorization".to_string(),
                basic_header(identifier, password),
            )],
            AuthContext::UnidentifiedAccessKey(key) => vec![(
                "Unidentified-Access-Key".to_string(),
                BASE64.encode(key),
            )],
            AuthContext::EnclaveToken {
                authorization,
                cookies,
            } => {
                let mut headers = vec![("Authorization".to_string(), authorization.clone())];
                if !cookies.is_empty() {
                    headers.push(("Cookie".to_string(), cookies.join("; ")));
                }
                headers
            }
            AuthContext::Authorization(value) => {
                vec![("Authorization".to_string(), value.clone())]
            }
        }
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            AuthContext::None => "None",
            AuthContext::Basic { .. } => "Basic",
            AuthContext::UnidentifiedAccessKey(_) => "UnidentifiedAccessKey",
            AuthContext::EnclaveToken { .. } => "EnclaveToken",
            AuthContext::Authorization(_) => "Authorization",
        };
        write!(f, "AuthContext::{}([REDACTED])", kind)
    }
}
