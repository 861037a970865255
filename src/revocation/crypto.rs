// Omnibolt Core Library implementing two-party payment channels over Omni
// layer assets
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.


use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bitcoin::hashes::{sha256, Hash};
use p2p::{CommitmentId, EncryptedSecret};
use secp256k1::ecdh::SharedSecret;
use secp256k1::rand::{thread_rng, RngCore};
use secp256k1::{PublicKey, SecretKey, SECP256K1};

const NONCE_SIZE: usize = 12;

/// Errors of the revocation secret encryption
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum CryptoError {
    /// unable to encrypt revocation secret
    Encryption,

    /// unable to decrypt revocation secret: wrong key or corrupted data
    Decryption,

    /// decrypted data is not a valid private key
    InvalidSecret,
}

fn cipher(secret: &SecretKey, pubkey: &PublicKey) -> Aes256Gcm {
    let shared = SharedSecret::new(pubkey, secret);
    let key = sha256::Hash::hash(&shared.secret_bytes());
    Aes256Gcm::new(GenericArray::from_slice(key.as_inner()))
}

/// Encrypts RSMC temporary private key of a commitment for the recipient
/// funding public key
pub fn encrypt_secret(
    secret: &SecretKey,
    recipient: &PublicKey,
    commitment_id: CommitmentId,
) -> Result<EncryptedSecret, CryptoError> {
    let (ephemeral_secret, ephemeral_pubkey) =
        SECP256K1.generate_keypair(&mut thread_rng());
    let mut nonce = vec![0u8; NONCE_SIZE];
    thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher(&ephemeral_secret, recipient)
        .encrypt(Nonce::from_slice(&nonce), Payload {
            msg: &secret.secret_bytes(),
            aad: commitment_id.as_bytes(),
        })
        .map_err(|_| CryptoError::Encryption)?;

    Ok(EncryptedSecret {
        commitment_id,
        ephemeral_pubkey,
        nonce,
        ciphertext,
    })
}

/// Decrypts revocation secret with the recipient funding private key
pub fn decrypt_secret(
    encrypted: &EncryptedSecret,
    recipient_secret: &SecretKey,
) -> Result<SecretKey, CryptoError> {
    if encrypted.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Decryption);
    }
    let plaintext = cipher(recipient_secret, &encrypted.ephemeral_pubkey)
        .decrypt(Nonce::from_slice(&encrypted.nonce), Payload {
            msg: &encrypted.ciphertext,
            aad: encrypted.commitment_id.as_bytes(),
        })
        .map_err(|_| CryptoError::Decryption)?;
    SecretKey::from_slice(&plaintext).map_err(|_| CryptoError::InvalidSecret)
}
