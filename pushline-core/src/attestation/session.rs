// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Attested enclave session.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use super::keys::RemoteAttestationKeys;
use super::AttestationError;

/// AES-GCM tag size.
pub const TAG_LEN: usize = 16;

/// A request sealed for the enclave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRequest {
    pub request_id: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
    pub data: Vec<u8>,
    pub mac: [u8; TAG_LEN],
}

/// Result of a successful handshake with one enclave.
///
/// Lives for one higher-level operation and is never persisted.
pub struct AttestationSession {
    request_id: Vec<u8>,
    keys: RemoteAttestationKeys,
    cookies: Vec<String>,
}

impl std::fmt::Debug for AttestationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSession")
            .field("request_id", &"[REDACTED]")
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

impl Drop for AttestationSession {
    fn drop(&mut self) {
        self.request_id.zeroize();
    }
}

fn aes_key(bytes: &[u8; 32]) -> Result<LessSafeKey, AttestationError> {
    UnboundKey::new(&AES_256_GCM, bytes)
        .map(LessSafeKey::new)
        .map_err(|_| AttestationError::Crypto("invalid key"))
}

/// Decrypts `ciphertext || tag` under `key`.
pub(crate) fn open_with(
    key: &[u8; 32],
    iv: &[u8],
    ciphertext: &[u8],
    mac: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AttestationError> {
    let nonce =
        Nonce::try_assume_unique_for_key(iv).map_err(|_| AttestationError::Crypto("invalid iv"))?;
    if mac.len() != TAG_LEN {
        return Err(AttestationError::Crypto("invalid tag"));
    }
    let mut in_out = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(mac);

    let plaintext_len = aes_key(key)?
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| AttestationError::Crypto("decryption failed"))?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

impl AttestationSession {
    pub fn new(request_id: Vec<u8>, keys: RemoteAttestationKeys, cookies: Vec<String>) -> Self {
        AttestationSession {
            request_id,
            keys,
            cookies,
        }
    }

    pub fn request_id(&self) -> &[u8] {
        &self.request_id
    }

    pub fn keys(&self) -> &RemoteAttestationKeys {
        &self.keys
    }

    /// Load-balancer cookies from the handshake, sent with every call.
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Encrypts a request under the client key, bound to the request id.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedRequest, AttestationError> {
        let mut iv = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut iv)
            .map_err(|_| AttestationError::Crypto("rng failure"))?;

        let mut data = plaintext.to_vec();
        let tag = aes_key(self.keys.client_key())?
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(iv),
                Aad::from(self.request_id.as_slice()),
                &mut data,
            )
            .map_err(|_| AttestationError::Crypto("encryption failed"))?;

        let mut mac = [0u8; TAG_LEN];
        mac.copy_from_slice(tag.as_ref());
        Ok(SealedRequest {
            request_id: self.request_id.clone(),
            iv,
            data,
            mac,
        })
    }

    /// Decrypts an enclave response under the server key.
    pub fn open(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
        mac: &[u8],
    ) -> Result<Vec<u8>, AttestationError> {
        open_with(self.keys.server_key(), iv, ciphertext, mac, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::keys::EphemeralKeyPair;

    fn session() -> AttestationSession {
        let client = EphemeralKeyPair::generate();
        let keys = RemoteAttestationKeys::derive(
            &client,
            &EphemeralKeyPair::generate().public_key(),
            &EphemeralKeyPair::generate().public_key(),
        )
        .unwrap();
        AttestationSession::new(vec![5; 16], keys, vec!["c=1".into()])
    }

    #[test]
    fn test_sealed_request_opens_with_client_key_and_request_id() {
        let s = session();
        let sealed = s.seal(b"lookup").unwrap();
        let plain = open_with(
            s.keys().client_key(),
            &sealed.iv,
            &sealed.data,
            &sealed.mac,
            s.request_id(),
        )
        .unwrap();
        assert_eq!(plain, b"lookup");

        // Wrong associated data must fail.
        let key = s.keys().client_key();
        assert!(open_with(key, &sealed.iv, &sealed.data, &sealed.mac, &[]).is_err());
    }

    #[test]
    fn test_open_rejects_tampered_tag() {
        let s = session();
        assert!(s.open(&[0; 12], b"data", &[0; 16]).is_err());
        assert!(s.open(&[0; 11], b"data", &[0; 16]).is_err());
    }
}
