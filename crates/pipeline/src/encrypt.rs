use crate::PipelineError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

/// Encryption stage strategy.
pub trait Encryptor {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError>;
}

/// Pass-through stage.
pub struct NoEncryption;

impl Encryptor for NoEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        Ok(data.to_vec())
    }
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM with a fresh random nonce per payload, prepended to the
/// ciphertext. The GCM tag also authenticates, so a wrong key or tampered
/// ciphertext fails here even without a pipeline checksum.
pub struct AesGcmEncryption {
    key: [u8; 32],
}

impl AesGcmEncryption {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the key from a passphrase via SHA-256. Convenience for hosts
    /// without their own key management.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        Self { key: digest.into() }
    }
}

impl Encryptor for AesGcmEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, data)
            .map_err(|e| PipelineError::Encryption(e.to_string()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, PipelineError> {
        if data.len() < NONCE_LEN {
            return Err(PipelineError::Encryption(
                "payload shorter than nonce".to_string(),
            ));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| PipelineError::Encryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_shared_key() {
        let enc = AesGcmEncryption::new([7_u8; 32]);
        let sealed = enc.encrypt(b"secret state").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"secret state");
        assert_eq!(enc.decrypt(&sealed).unwrap(), b"secret state");
    }

    #[test]
    fn nonce_makes_ciphertext_unique() {
        let enc = AesGcmEncryption::from_passphrase("pw");
        let a = enc.encrypt(b"same input").unwrap();
        let b = enc.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let enc = AesGcmEncryption::new([1_u8; 32]);
        let mut sealed = enc.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(enc.decrypt(&sealed).is_err());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let enc = AesGcmEncryption::new([1_u8; 32]);
        assert!(enc.decrypt(&[0_u8; 4]).is_err());
    }
}
