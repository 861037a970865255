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

use secp256k1::ecdsa::Signature;
use secp256k1::Message;
use serde::{Deserialize, Serialize};

use crate::{tagged_message, ChannelId, CommitmentId, EncryptedSecret};

/// Commitment update message.
///
/// Sent by the payer to propose a new split of the channel funds, in which
/// case it carries the payer signature. Once the payee signs the new
/// commitments, the same message type carries the encrypted revocation
/// secret of the commitment superseded by the update.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("commitment_tx({channel_id}, {property_id}, {amount}, ...)")]
pub struct CommitmentTx {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Omni property id of the channel asset
    pub property_id: u32,

    /// Amount paid by the sender to the counterparty
    pub amount: u64,

    /// Sequence number of the commitments created by the update, which is
    /// the number of the commitments it supersedes plus one
    pub commitment_number: u64,

    /// Payer signature over the proposal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,

    /// RSMC temporary private key of the superseded commitment encrypted for
    /// the recipient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_revocation_secret: Option<EncryptedSecret>,
}

impl CommitmentTx {
    /// Message which must be signed by the payer
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "commitment_tx",
            format!(
                "{}:{}:{}:{}",
                self.channel_id,
                self.property_id,
                self.amount,
                self.commitment_number
            ),
        )
    }

    /// Detects whether the message discloses a revocation secret rather than
    /// proposes a new commitment
    #[inline]
    pub fn is_disclosure(&self) -> bool {
        self.encrypted_revocation_secret.is_some()
    }
}

/// Payee acceptance of the proposed commitment update
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("commitment_tx_signed({channel_id}, {property_id}, {amount}, ...)")]
pub struct CommitmentTxSigned {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Omni property id of the channel asset
    pub property_id: u32,

    /// Amount paid by the counterparty to the sender
    pub amount: u64,

    /// Sequence number of the commitments created by the update
    pub commitment_number: u64,

    /// Payee signature over the update
    pub receiver_signature: Signature,
}

impl CommitmentTxSigned {
    /// Message which must be signed by the payee
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "commitment_tx_signed",
            format!(
                "{}:{}:{}:{}",
                self.channel_id,
                self.property_id,
                self.amount,
                self.commitment_number
            ),
        )
    }
}

/// Acknowledgement of a received revocation secret. Disclosure of the secret
/// is final only once it is acknowledged by the recipient.
#[derive(
    Clone, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[display("revocation_ack({channel_id}, {commitment_id})")]
pub struct RevocationAck {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Commitment which revocation secret was received
    pub commitment_id: CommitmentId,
}
