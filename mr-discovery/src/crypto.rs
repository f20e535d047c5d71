//! The AES-128-CBC envelope used to encrypt a replica's canonical result
//! under its per-task key (§4.6, §6), grounded on
//! `examples/original_source/ec262/discovery.py`'s `_crypt_data`
//! (`AES.new(key, AES.MODE_CBC)` with an implicit all-zero IV, since pycrypto
//! defaults to one when none is passed).

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::BlockDecryptMut;
use cbc::cipher::BlockEncryptMut;
use cbc::cipher::KeyIvInit;

pub const KEY_LEN: usize = 16;

/// Matches the source's implicit zero IV. The per-task key is never reused
/// across tasks (§4.3), so a fixed IV does not create a two-time pad.
const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext length {0} is not a multiple of the AES block size")]
    UnalignedCiphertext(usize),
}

/// Encrypts an already block-aligned plaintext (see
/// [`mr_messages::vote::encode_canonical`], which space-pads to 16 bytes)
/// under the task's key.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.into(), &ZERO_IV.into())
        .encrypt_padded_vec_mut::<NoPadding>(plaintext)
}

/// Decrypts a ciphertext produced by [`encrypt`]. The caller (the foreman) is
/// expected to trim the trailing space padding and parse the result with
/// [`mr_messages::vote::decode_canonical`].
pub fn decrypt(key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() % 16 != 0 {
        return Err(CryptoError::UnalignedCiphertext(ciphertext.len()));
    }
    Aes128CbcDec::new(key.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::UnalignedCiphertext(ciphertext.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = [7u8; KEY_LEN];
        let plaintext = b"[[\"a\",1],[\"b\",2]] "; // 16-byte aligned already
        let ciphertext = encrypt(&key, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len());
        let recovered = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn different_keys_produce_different_ciphertexts() {
        let plaintext = b"0123456789abcdef";
        let a = encrypt(&[1u8; KEY_LEN], plaintext);
        let b = encrypt(&[2u8; KEY_LEN], plaintext);
        assert_ne!(a, b);
    }

    #[test]
    fn unaligned_ciphertext_is_rejected() {
        let key = [0u8; KEY_LEN];
        assert!(matches!(
            decrypt(&key, b"short"),
            Err(CryptoError::UnalignedCiphertext(_))
        ));
    }
}
