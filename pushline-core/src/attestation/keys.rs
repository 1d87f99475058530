// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Attestation key agreement.
//!
//! The client's ephemeral secret is agreed with both the server's ephemeral
//! and static keys, so it is an `x25519-dalek` static secret: ring's
//! ephemeral keys can only be used once.

use rand::rngs::OsRng;
use ring::hkdf::{self, Salt, HKDF_SHA256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AttestationError;

/// Fresh key pair for one attestation attempt.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        EphemeralKeyPair { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public.as_bytes())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

struct OutputLen(usize);

impl hkdf::KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// Session keys shared with one enclave.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RemoteAttestationKeys {
    client_key: [u8; 32],
    server_key: [u8; 32],
}

impl RemoteAttestationKeys {
    /// HKDF-SHA256 over `DH(e, server_ephemeral) || DH(e, server_static)`,
    /// salted with all three public keys.
    pub fn derive(
        keys: &EphemeralKeyPair,
        server_ephemeral: &[u8],
        server_static: &[u8],
    ) -> Result<Self, AttestationError> {
        let server_ephemeral = public_key(server_ephemeral, "server ephemeral")?;
        let server_static = public_key(server_static, "server static")?;

        let ephemeral_shared = keys.secret.diffie_hellman(&server_ephemeral);
        let static_shared = keys.secret.diffie_hellman(&server_static);

        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(ephemeral_shared.as_bytes());
        ikm[32..].copy_from_slice(static_shared.as_bytes());

        let mut salt = [0u8; 96];
        salt[..32].copy_from_slice(keys.public.as_bytes());
        salt[32..64].copy_from_slice(server_ephemeral.as_bytes());
        salt[64..].copy_from_slice(server_static.as_bytes());

        let prk = Salt::new(HKDF_SHA256, &salt).extract(&ikm);
        ikm.zeroize();

        let mut okm = [0u8; 64];
        prk.expand(&[], OutputLen(okm.len()))
            .and_then(|o| o.fill(&mut okm))
            .map_err(|_| AttestationError::KeyDerivation)?;

        let mut derived = RemoteAttestationKeys {
            client_key: [0u8; 32],
            server_key: [0u8; 32],
        };
        derived.client_key.copy_from_slice(&okm[..32]);
        derived.server_key.copy_from_slice(&okm[32..]);
        okm.zeroize();
        Ok(derived)
    }

    /// Key for client-to-enclave messages.
    pub fn client_key(&self) -> &[u8; 32] {
        &self.client_key
    }

    /// Key for enclave-to-client messages.
    pub fn server_key(&self) -> &[u8; 32] {
        &self.server_key
    }
}

impl std::fmt::Debug for RemoteAttestationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RemoteAttestationKeys([REDACTED])")
    }
}

fn public_key(bytes: &[u8], which: &'static str) -> Result<PublicKey, AttestationError> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AttestationError::InvalidKey(which))?;
    Ok(PublicKey::from(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_sides_agree() {
        let client = EphemeralKeyPair::generate();
        let server_ephemeral = EphemeralKeyPair::generate();
        let server_static = EphemeralKeyPair::generate();

        let keys = RemoteAttestationKeys::derive(
            &client,
            &server_ephemeral.public_key(),
            &server_static.public_key(),
        )
        .unwrap();

        // Server side: same shared secrets from its own private keys.
        let client_public = PublicKey::from(client.public_key());
        let mut ikm = Vec::new();
        ikm.extend_from_slice(server_ephemeral.secret.diffie_hellman(&client_public).as_bytes());
        ikm.extend_from_slice(server_static.secret.diffie_hellman(&client_public).as_bytes());
        let mut salt = Vec::new();
        salt.extend_from_slice(&client.public_key());
        salt.extend_from_slice(&server_ephemeral.public_key());
        salt.extend_from_slice(&server_static.public_key());
        let mut okm = [0u8; 64];
        Salt::new(HKDF_SHA256, &salt)
            .extract(&ikm)
            .expand(&[], OutputLen(64))
            .unwrap()
            .fill(&mut okm)
            .unwrap();

        assert_eq!(keys.client_key(), &okm[..32]);
        assert_eq!(keys.server_key(), &okm[32..]);
    }

    #[test]
    fn test_rejects_short_keys() {
        let client = EphemeralKeyPair::generate();
        let result = RemoteAttestationKeys::derive(&client, &[0u8; 31], &[0u8; 32]);
        assert!(matches!(
            result,
            Err(AttestationError::InvalidKey("server ephemeral"))
        ));
    }

    #[test]
    fn test_fresh_keys_per_attempt() {
        assert_ne!(
            EphemeralKeyPair::generate().public_key(),
            EphemeralKeyPair::generate().public_key()
        );
    }
}
