// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use base64::{engine::general_purpose, Engine as _};
use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
    NONCE_LEN,
};
use ring::rand::{SecureRandom, SystemRandom};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::raise_error;

const KEY_LEN: usize = 32;

struct SingleNonceSequence([u8; NONCE_LEN]);

impl NonceSequence for SingleNonceSequence {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        Ok(Nonce::assume_unique_for_key(self.0))
    }
}

/// AES-256-GCM credential cipher.
///
/// Output layout is `base64(nonce || ciphertext || tag)` with the standard alphabet.
/// The empty string maps to itself in both directions so unset secrets stay unset.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Keys shorter than 32 bytes are zero padded, longer ones truncated.
    pub fn new(passphrase: &str) -> Self {
        let mut key = [0u8; KEY_LEN];
        let bytes = passphrase.as_bytes();
        let len = bytes.len().min(KEY_LEN);
        key[..len].copy_from_slice(&bytes[..len]);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> MailFusionResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        self.seal(plaintext)
            .map_err(|_| raise_error!("Failed to encrypt string.".into(), ErrorCode::InternalError))
    }

    pub fn decrypt(&self, data: &str) -> MailFusionResult<String> {
        if data.is_empty() {
            return Ok(String::new());
        }
        self.open(data).map_err(|_| {
            raise_error!(
                "Decryption failed, likely due to incorrect encryption key or corrupted data"
                    .into(),
                ErrorCode::InternalError
            )
        })
    }

    fn seal(&self, plaintext: &str) -> Result<String, ring::error::Unspecified> {
        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)?;
        let mut sealing_key = SealingKey::new(unbound_key, SingleNonceSequence(nonce_bytes));
        let mut in_out = plaintext.as_bytes().to_vec();
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut in_out)?;

        let mut result = Vec::with_capacity(NONCE_LEN + in_out.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&in_out);
        Ok(general_purpose::STANDARD.encode(&result))
    }

    fn open(&self, data: &str) -> Result<String, ring::error::Unspecified> {
        let data = general_purpose::STANDARD
            .decode(data)
            .map_err(|_| ring::error::Unspecified)?;
        if data.len() < NONCE_LEN {
            return Err(ring::error::Unspecified);
        }
        let nonce_bytes: [u8; NONCE_LEN] = data[..NONCE_LEN]
            .try_into()
            .map_err(|_| ring::error::Unspecified)?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)?;
        let mut opening_key = OpeningKey::new(unbound_key, SingleNonceSequence(nonce_bytes));
        let mut in_out = data[NONCE_LEN..].to_vec();
        let decrypted = opening_key.open_in_place(Aad::empty(), &mut in_out)?;
        String::from_utf8(decrypted.to_vec()).map_err(|_| ring::error::Unspecified)
    }
}
