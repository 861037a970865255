// Omnibolt P2P library, implementing messaging of two-party payment channels
// over Omni layer assets
//
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

use amplify::hex::{self, FromHex};
use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::Address;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;
use serde_with::{serde_as, As, DisplayFromStr};

/// Identity of a channel peer used as a sender and recipient of message
/// envelopes
#[derive(
    Wrapper,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
#[display(inner)]
pub struct PeerId(String);

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_owned())
    }
}

/// Omnibolt channel id: SHA256 hash of the channel 2-of-2 multisig address
/// string, which makes it unique per funding address
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChannelId(#[serde(with = "As::<DisplayFromStr>")] Slice32);

impl FromHex for ChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl ChannelId {
    /// Derives channel id from the channel multisig address
    pub fn with(channel_address: &Address) -> Self {
        let hash = sha256::Hash::hash(channel_address.to_string().as_bytes());
        ChannelId::from_inner(Slice32::from_inner(hash.into_inner()))
    }
}

/// Temporary channel id used until the channel multisig address becomes known
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct TempChannelId(#[serde(with = "As::<DisplayFromStr>")] Slice32);

impl FromHex for TempChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl TempChannelId {
    pub fn random() -> Self {
        TempChannelId::from_inner(Slice32::random())
    }
}

impl DumbDefault for TempChannelId {
    fn dumb_default() -> Self {
        Self(Default::default())
    }
}

/// Channel id which may be either temporary (before the channel multisig
/// address is known) or permanent
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    Serialize,
    Deserialize
)]
#[display(inner)]
pub enum ActiveChannelId {
    /// Temporary channel id
    #[from]
    Temporary(TempChannelId),

    /// Permanent channel id
    #[from]
    Static(ChannelId),
}

impl ActiveChannelId {
    /// Returns permanent channel id, if known
    #[inline]
    pub fn channel_id(self) -> Option<ChannelId> {
        match self {
            ActiveChannelId::Static(id) => Some(id),
            ActiveChannelId::Temporary(_) => None,
        }
    }

    /// Returns temporary channel id, if the channel id is not yet permanent
    #[inline]
    pub fn temp_channel_id(self) -> Option<TempChannelId> {
        match self {
            ActiveChannelId::Temporary(id) => Some(id),
            ActiveChannelId::Static(_) => None,
        }
    }
}

/// Id of a commitment transaction, committing to the channel, commitment
/// owner, commitment number and RSMC temporary public key
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct CommitmentId(#[serde(with = "As::<DisplayFromStr>")] Slice32);

impl CommitmentId {
    pub fn with(
        channel_id: ChannelId,
        owner: &PeerId,
        number: u64,
        rsmc_pubkey: &PublicKey,
    ) -> Self {
        let mut engine = sha256::Hash::engine();
        engine.input(channel_id.as_inner().as_inner());
        engine.input(owner.as_inner().as_bytes());
        engine.input(&number.to_be_bytes());
        engine.input(&rsmc_pubkey.serialize());
        let hash = sha256::Hash::from_engine(engine);
        CommitmentId::from_inner(Slice32::from_inner(hash.into_inner()))
    }

    /// Byte representation used as associated data in encrypted revocation
    /// secrets
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.as_inner().as_inner()
    }
}

/// RSMC temporary private key of a superseded commitment, encrypted for the
/// counterparty.
///
/// Encryption key is SHA256 of ECDH shared secret between the ephemeral key
/// and the recipient funding public key; the cipher is AES-256-GCM with the
/// commitment id used as associated data.
#[serde_as]
#[derive(
    Clone, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[display("encrypted_secret({commitment_id}, {ephemeral_pubkey}, ...)")]
pub struct EncryptedSecret {
    /// Commitment which RSMC temporary key is disclosed
    pub commitment_id: CommitmentId,

    /// Ephemeral public key used in ECDH with the recipient funding key
    pub ephemeral_pubkey: PublicKey,

    /// AES-GCM nonce
    #[serde_as(as = "Hex")]
    pub nonce: Vec<u8>,

    /// Encrypted 32-byte private key with authentication tag
    #[serde_as(as = "Hex")]
    pub ciphertext: Vec<u8>,
}
