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


//! Online peers and custody of the temporary commitment keys

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use p2p::PeerId;
use secp256k1::rand::thread_rng;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

/// Errors of the session key custody
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SessionError {
    /// no private key is kept for the temporary public key {0}
    UnknownKey(PublicKey),
}

/// Presence of the peers connected to the hub
pub trait Presence: Send + Sync {
    fn is_online(&self, peer: &PeerId) -> bool;
}

/// Custody of the private keys of RSMC and HTLC temporary public keys, which
/// are kept until the commitment using them is revoked
pub trait KeyCustody: Send + Sync {
    /// Generates new temporary key pair, keeping the private key
    fn generate(&self) -> PublicKey;

    fn secret_for(&self, pubkey: &PublicKey) -> Result<SecretKey, SessionError>;

    /// Forgets the private key
    fn discard(&self, pubkey: &PublicKey);
}

/// Session registry of the hub
#[derive(Debug, Default)]
pub struct Session {
    online: RwLock<HashSet<PeerId>>,
    keys: Mutex<HashMap<PublicKey, SecretKey>>,
}

impl Session {
    pub fn new() -> Self {
        default!()
    }

    pub fn set_online(&self, peer: PeerId, online: bool) {
        let mut peers =
            self.online.write().unwrap_or_else(PoisonError::into_inner);
        if online {
            debug!("Peer {} is online", peer);
            peers.insert(peer);
        } else {
            debug!("Peer {} went offline", peer);
            peers.remove(&peer);
        }
    }
}

impl Presence for Session {
    fn is_online(&self, peer: &PeerId) -> bool {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(peer)
    }
}

impl KeyCustody for Session {
    fn generate(&self) -> PublicKey {
        let (secret, pubkey) = SECP256K1.generate_keypair(&mut thread_rng());
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pubkey, secret);
        pubkey
    }

    fn secret_for(
        &self,
        pubkey: &PublicKey,
    ) -> Result<SecretKey, SessionError> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pubkey)
            .copied()
            .ok_or(SessionError::UnknownKey(*pubkey))
    }

    fn discard(&self, pubkey: &PublicKey) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pubkey);
    }
}
