//! the kind-4 encrypted direct message scheme
//!
//! content is AES-256-CBC encrypted under the x coordinate of an ECDH
//! shared point and shipped as `"<ciphertext-b64>?iv=<iv-b64>"`. the codec
//! only transforms strings; placing the result in an event's content and
//! recording the counterparty in a `p` tag is the caller's business.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use thiserror::Error;

use crate::{PubKey, SecretKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Error, Debug, PartialEq)]
pub enum DecryptError {
    #[error("missing \"?iv=\" marker")]
    MissingIv,

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("initialization vector must be 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("ciphertext length inconsistent with block size or padding")]
    InvalidPadding,

    #[error("decrypted content is not valid utf-8")]
    InvalidUtf8,
}

/// derive the symmetric key shared between two parties
///
/// plain ECDH with no key derivation on top: the key is the x coordinate
/// of the shared point. either party computes the same key from its own
/// secret key and the other's public key.
pub fn shared_secret(sk: &SecretKey, pk: &PubKey) -> [u8; 32] {
    let point = secp256k1::ecdh::shared_secret_point(&pk.to_ecdsa_key(), &sk.to_ecdsa_key());

    let mut key = [0u8; 32];
    key.copy_from_slice(&point[0..32]);
    key
}

/// encrypt a message with a fresh random initialization vector
///
/// two calls with identical inputs never produce identical output.
pub fn encrypt(plaintext: &str, shared_secret: &[u8; 32]) -> String {
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);
    encrypt_with_iv(plaintext, shared_secret, &iv)
}

fn encrypt_with_iv(plaintext: &str, shared_secret: &[u8; 32], iv: &[u8; 16]) -> String {
    let ciphertext = Aes256CbcEnc::new(shared_secret.into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    format!(
        "{}?iv={}",
        general_purpose::STANDARD.encode(&ciphertext),
        general_purpose::STANDARD.encode(iv)
    )
}

/// decrypt `"<ciphertext-b64>?iv=<iv-b64>"` content
pub fn decrypt(content: &str, shared_secret: &[u8; 32]) -> Result<String, DecryptError> {
    let (ciphertext_b64, iv_b64) = content.split_once("?iv=").ok_or(DecryptError::MissingIv)?;

    let ciphertext = general_purpose::STANDARD.decode(ciphertext_b64)?;
    let iv: [u8; 16] = general_purpose::STANDARD
        .decode(iv_b64)?
        .try_into()
        .map_err(|bad: Vec<u8>| DecryptError::InvalidIvLength(bad.len()))?;

    let plaintext = Aes256CbcDec::new(shared_secret.into(), (&iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecryptError::InvalidPadding)?;

    String::from_utf8(plaintext).map_err(|_| DecryptError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(hex: &str) -> (SecretKey, PubKey) {
        let sk = SecretKey::from_hex(hex).unwrap();
        let pk = sk.pubkey();
        (sk, pk)
    }

    #[test]
    fn test_shared_secret_is_symmetric() {
        let (sk1, pk1) = keypair("7f4c11a9742721d66e40e321ca50b682c27f7422190c14a187525e69e604836a");
        let (sk2, pk2) = keypair("203b892f1d671fec43a04b36c452de631c9cf55b7a93b75d97ff1e41d217f038");

        assert_eq!(shared_secret(&sk1, &pk2), shared_secret(&sk2, &pk1));
        assert_ne!(shared_secret(&sk1, &pk2), shared_secret(&sk1, &pk1));
    }

    #[test]
    fn test_decrypt_known_ciphertext() {
        // reference message produced by another client implementation
        let sender_pk = PubKey::from_hex(
            "6b6945b592d9690e1017856e8ff2173136f9b556db3cf62b6efa0712807fbcda",
        )
        .unwrap();
        let receiver_sk = SecretKey::from_hex(
            "64109d2af3ee77b5564b96902ebd7a5ef621e6f956020cee29261c913aa93ced",
        )
        .unwrap();

        let key = shared_secret(&receiver_sk, &sender_pk);
        let plaintext =
            decrypt("Fo2kKdCmAk6JULpt503Lxg==?iv=tlklmSI8kmK939dflSZT8g==", &key).unwrap();
        assert_eq!(plaintext, "Guarani");
    }

    #[test]
    fn test_roundtrip() {
        let (sk1, _) = keypair("7f4c11a9742721d66e40e321ca50b682c27f7422190c14a187525e69e604836a");
        let (sk2, pk2) = keypair("203b892f1d671fec43a04b36c452de631c9cf55b7a93b75d97ff1e41d217f038");
        let key = shared_secret(&sk1, &pk2);

        for msg in [
            "",
            "test",
            "exactly sixteen!",
            "a much longer message with unicode ⚡ and \"quotes\" and\nnewlines",
        ] {
            let wire = encrypt(msg, &key);
            assert!(wire.contains("?iv="));
            // either party that can derive the key reads it back
            assert_eq!(decrypt(&wire, &key).unwrap(), msg);
            assert_eq!(
                decrypt(&wire, &shared_secret(&sk2, &sk1.pubkey())).unwrap(),
                msg
            );
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = [7u8; 32];
        assert_ne!(encrypt("same message", &key), encrypt("same message", &key));
    }

    #[test]
    fn test_decrypt_rejects_malformed_content() {
        let key = [7u8; 32];

        assert_eq!(
            decrypt("bm8gbWFya2VyIGhlcmU=", &key),
            Err(DecryptError::MissingIv)
        );
        assert!(matches!(
            decrypt("!!!not-base64!!!?iv=dGVzdA==", &key),
            Err(DecryptError::InvalidBase64(_))
        ));
        assert_eq!(
            decrypt("Fo2kKdCmAk6JULpt503Lxg==?iv=dG9vc2hvcnQ=", &key),
            Err(DecryptError::InvalidIvLength(8))
        );
        // ciphertext not a multiple of the block size
        assert_eq!(
            decrypt("YWJj?iv=tlklmSI8kmK939dflSZT8g==", &key),
            Err(DecryptError::InvalidPadding)
        );
        // wrong key never yields the original plaintext
        let wire = encrypt("hello", &key);
        assert_ne!(decrypt(&wire, &[8u8; 32]).ok().as_deref(), Some("hello"));
    }
}
