use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use thiserror::Error;

/// 4-byte magic marking an encrypted payload.
pub const MAGIC: &[u8; 4] = b"MSEH";

/// Current envelope version.
const VERSION: u8 = 1;

/// AES-GCM nonce width in bytes.
const NONCE_LEN: usize = 12;

/// Identifies which field a ciphertext belongs to. Bound into the AEAD as
/// associated data so a ciphertext cannot be replayed across fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    GroupTitle,
    EntryContent,
    AttachmentBlob,
}

impl FieldId {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            FieldId::GroupTitle => b"conversation_group.title",
            FieldId::EntryContent => b"entry.content",
            FieldId::AttachmentBlob => b"attachment.blob",
        }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key, corrupted data, or field mismatch)")]
    Decrypt,

    #[error("envelope truncated: {0} bytes")]
    Truncated(usize),

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
}

/// AES-256-GCM envelope codec over a single data-encryption key.
///
/// Cloneable and cheap to share; the cipher is keyed once at construction.
#[derive(Clone)]
pub struct Envelope {
    cipher: Aes256Gcm,
}

impl Envelope {
    pub fn new(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(key_bytes.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Seal plaintext into the framed envelope.
    pub fn seal(&self, field: FieldId, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encrypt)?;

        let mut framed = Vec::with_capacity(MAGIC.len() + 1 + NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(MAGIC);
        framed.push(VERSION);
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    /// Open a framed value. Values without the magic header are returned
    /// as-is: they predate encryption.
    pub fn open(&self, field: FieldId, framed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if !framed.starts_with(MAGIC) {
            return Ok(framed.to_vec());
        }
        let header_len = MAGIC.len() + 1 + NONCE_LEN;
        if framed.len() < header_len {
            return Err(CryptoError::Truncated(framed.len()));
        }
        let version = framed[MAGIC.len()];
        if version != VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }
        let nonce = Nonce::from_slice(&framed[MAGIC.len() + 1..header_len]);
        let ciphertext = &framed[header_len..];

        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Decrypt)
    }

    /// Seal a UTF-8 string field.
    pub fn seal_str(&self, field: FieldId, value: &str) -> Result<Vec<u8>, CryptoError> {
        self.seal(field, value.as_bytes())
    }

    /// Open a UTF-8 string field. Invalid UTF-8 after decryption is a
    /// decrypt failure: the key or field id was wrong.
    pub fn open_str(&self, field: FieldId, framed: &[u8]) -> Result<String, CryptoError> {
        let plaintext = self.open(field, framed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material.
        f.debug_struct("Envelope").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trip_restores_plaintext() {
        let env = envelope();
        for input in [&b""[..], b"hello", &[0u8; 4096][..]] {
            let sealed = env.seal(FieldId::EntryContent, input).unwrap();
            assert!(sealed.starts_with(MAGIC));
            let opened = env.open(FieldId::EntryContent, &sealed).unwrap();
            assert_eq!(opened, input);
        }
    }

    #[test]
    fn plaintext_without_magic_passes_through() {
        let env = envelope();
        let legacy = b"pre-encryption title";
        let opened = env.open(FieldId::GroupTitle, legacy).unwrap();
        assert_eq!(opened, legacy);
    }

    #[test]
    fn field_mismatch_fails_decryption() {
        let env = envelope();
        let sealed = env.seal(FieldId::GroupTitle, b"secret").unwrap();
        assert!(matches!(
            env.open(FieldId::EntryContent, &sealed),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let sealed = envelope().seal(FieldId::EntryContent, b"secret").unwrap();
        let other = Envelope::new(&[8u8; 32]).unwrap();
        assert!(matches!(
            other.open(FieldId::EntryContent, &sealed),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn truncated_envelope_rejected() {
        let env = envelope();
        let mut sealed = env.seal(FieldId::EntryContent, b"secret").unwrap();
        sealed.truncate(MAGIC.len() + 3);
        assert!(matches!(
            env.open(FieldId::EntryContent, &sealed),
            Err(CryptoError::Truncated(_))
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let env = envelope();
        let mut sealed = env.seal(FieldId::EntryContent, b"secret").unwrap();
        sealed[MAGIC.len()] = 99;
        assert!(matches!(
            env.open(FieldId::EntryContent, &sealed),
            Err(CryptoError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(matches!(
            Envelope::new(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn string_round_trip() {
        let env = envelope();
        let sealed = env.seal_str(FieldId::GroupTitle, "Ein Titel ✓").unwrap();
        assert_eq!(
            env.open_str(FieldId::GroupTitle, &sealed).unwrap(),
            "Ein Titel ✓"
        );
    }
}
