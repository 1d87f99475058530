// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! JSON request and response bodies of the main API and enclaves.
//!
//! Key material travels as base64 strings and is passed through untouched.

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub uuid: String,
    #[serde(default)]
    pub number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyStatus {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyEntity {
    pub key_id: u32,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreKeyEntity {
    pub key_id: u32,
    pub public_key: String,
    pub signature: String,
}

/// Upload of a fresh batch of one-time prekeys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyState {
    pub identity_key: String,
    pub signed_pre_key: SignedPreKeyEntity,
    pub pre_keys: Vec<PreKeyEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyResponseItem {
    pub device_id: u32,
    pub registration_id: u32,
    #[serde(default)]
    pub signed_pre_key: Option<SignedPreKeyEntity>,
    #[serde(default)]
    pub pre_key: Option<PreKeyEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyResponse {
    pub identity_key: String,
    pub devices: Vec<PreKeyResponseItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPushMessage {
    #[serde(rename = "type")]
    pub kind: u32,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    /// Encrypted message content, base64.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPushMessageList {
    pub destination: String,
    pub timestamp: u64,
    pub messages: Vec<OutgoingPushMessage>,
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageResponse {
    pub needs_sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileEntity {
    pub identity_key: Option<String>,
    pub name: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub unidentified_access: Option<String>,
    pub unrestricted_unidentified_access: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigEntry {
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfigResponse {
    pub config: Vec<RemoteConfigEntry>,
}

/// Key backup token.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde_as(as = "Base64")]
    pub backup_id: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub token: Vec<u8>,
    pub tries: u32,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("backup_id", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("tries", &self.tries)
            .finish()
    }
}

/// Request sealed to an attested enclave.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveRequestEntity {
    #[serde_as(as = "Base64")]
    pub request_id: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub iv: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub mac: Vec<u8>,
}

/// Response sealed by an attested enclave.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveResponseEntity {
    #[serde_as(as = "Base64")]
    pub iv: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub mac: Vec<u8>,
}
