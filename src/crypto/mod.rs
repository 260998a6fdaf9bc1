//! At-rest encryption for conversation titles, entry content, and
//! attachment payloads.
//!
//! Every encrypted field is framed as
//! `MSEH || version || nonce || AES-256-GCM ciphertext` with the field id
//! as associated data. Values without the magic header pass through as
//! plaintext, which lets pre-encryption rows survive schema migration.

mod envelope;
mod keys;

pub use envelope::{CryptoError, Envelope, FieldId, MAGIC};
pub use keys::DekProvider;
