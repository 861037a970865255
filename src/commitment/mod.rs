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


//! Commitment transactions and their supersession

mod engine;

pub use engine::CommitmentEngine;

use bitcoin::blockdata::script::Builder;
use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};
use bitcoin::{Address, PackedLockTime, Script, Sequence, Transaction, Txid};
use chrono::{DateTime, Utc};
use p2p::{ChannelId, CommitmentId, PeerId, BTC_PROPERTY_ID};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::channel::FundingTransaction;

/// Marker of the Omni layer payload in OP_RETURN outputs
const OMNI_MARKER: &[u8] = b"omni";

/// Commitment transaction state
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
    Serialize,
    Deserialize
)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentState {
    /// Constructed and waiting for the counterparty signature
    #[display("created")]
    Created,

    /// Signed by the counterparty; the latest signed commitment of an owner
    /// is the one that can be published
    #[display("signed")]
    Signed,

    /// Superseded and its RSMC temporary secret is disclosed
    #[display("revoked")]
    Revoked,

    /// Channel is closed
    #[display("closed")]
    Closed,

    /// Update was abandoned before signing
    #[display("cancelled")]
    Cancelled,
}

/// Output spent by a transaction
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[display("{txid}:{vout}")]
pub struct InputRef {
    pub txid: Txid,
    pub vout: u32,
    pub amount: u64,
}

impl InputRef {
    #[inline]
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// Input of a new commitment
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum InputSource {
    /// The initial commitment of an owner spends the channel funding
    Funding(FundingTransaction),

    /// Update superseding the latest signed commitment of the owner; the new
    /// commitment spends the same funding output
    Previous(CommitmentId),
}

/// Distribution of the commitment input between its outputs
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Split {
    /// Funds of the commitment owner, locked in RSMC output
    pub to_rsmc: u64,

    /// Funds of the counterparty
    pub to_other: u64,

    /// Funds locked in HTLC output
    pub to_htlc: u64,

    /// Temporary key of the owner used in RSMC multisig
    pub rsmc_pubkey: PublicKey,

    /// Temporary key of the owner used in HTLC multisig
    pub htlc_pubkey: Option<PublicKey>,
}

/// HTLC output of a commitment
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HtlcOutput {
    pub pubkey: PublicKey,
    pub address: Address,
    pub redeem_script: Script,
    pub script_pubkey: Script,
}

/// Commitment transaction owned by one of the channel peers: the owner is
/// able to publish it, getting its funds after the revocable delivery delay
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CommitmentTransaction {
    pub id: CommitmentId,
    pub channel_id: ChannelId,
    pub property_id: u32,
    pub owner: PeerId,

    /// Sequence number of the owner commitments in the channel
    pub number: u64,

    pub input: InputRef,

    /// Script sig of the P2SH-wrapped funding input
    pub input_script_sig: Script,

    /// Commitment superseded by this one
    pub supersedes: Option<CommitmentId>,

    pub rsmc_pubkey: PublicKey,
    pub rsmc_address: Address,
    pub rsmc_redeem_script: Script,
    pub rsmc_script_pubkey: Script,

    pub htlc: Option<HtlcOutput>,

    /// Address of the counterparty
    pub other_address: Address,
    pub other_script_pubkey: Script,

    pub amount_to_rsmc: u64,
    pub amount_to_other: u64,
    pub amount_to_htlc: u64,

    pub counterparty_signature: Option<Signature>,

    pub state: CommitmentState,

    pub created_at: DateTime<Utc>,
    pub edited_at: DateTime<Utc>,
}

/// Omni layer simple send payload: version 0, transaction type 0, property
/// id and amount in big-endian encoding
pub(crate) fn omni_simple_send(property_id: u32, amount: u64) -> Script {
    let mut payload = OMNI_MARKER.to_vec();
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&property_id.to_be_bytes());
    payload.extend_from_slice(&amount.to_be_bytes());
    Script::new_op_return(&payload)
}

/// Script sig spending a P2SH-wrapped P2WSH output: a single push of the
/// witness program. Signatures go into the witness, so transactions spending
/// channel multisigs have their txid known before they are signed.
pub(crate) fn nested_script_sig(witness_script: &Script) -> Script {
    Builder::new()
        .push_slice(witness_script.to_v0_p2wsh().as_bytes())
        .into_script()
}

impl CommitmentTransaction {
    /// Sum of all commitment outputs
    #[inline]
    pub fn outputs_amount(&self) -> u64 {
        self.amount_to_rsmc + self.amount_to_other + self.amount_to_htlc
    }

    /// Part of the input not distributed to the outputs
    #[inline]
    pub fn fee(&self) -> u64 {
        self.input.amount.saturating_sub(self.outputs_amount())
    }

    /// All temporary keys used by the commitment
    pub fn temp_pubkeys(&self) -> impl Iterator<Item = PublicKey> {
        Some(self.rsmc_pubkey)
            .into_iter()
            .chain(self.htlc.as_ref().map(|htlc| htlc.pubkey))
    }

    /// Renders commitment transaction without the witness. RSMC output is
    /// always the
    /// first one, followed by the counterparty output and an optional HTLC
    /// output. Channels of Omni layer assets get an extra OP_RETURN output
    /// with the asset transfer to the RSMC output.
    pub fn unsigned_tx(&self) -> Transaction {
        let is_asset = self.property_id != BTC_PROPERTY_ID;
        let value = |amount: u64| if is_asset { 0 } else { amount };
        let mut output = vec![
            TxOut {
                value: value(self.amount_to_rsmc),
                script_pubkey: self.rsmc_script_pubkey.clone(),
            },
            TxOut {
                value: value(self.amount_to_other),
                script_pubkey: self.other_script_pubkey.clone(),
            },
        ];
        if let Some(ref htlc) = self.htlc {
            output.push(TxOut {
                value: value(self.amount_to_htlc),
                script_pubkey: htlc.script_pubkey.clone(),
            });
        }
        if is_asset {
            output.push(TxOut {
                value: 0,
                script_pubkey: omni_simple_send(
                    self.property_id,
                    self.amount_to_rsmc,
                ),
            });
        }
        Transaction {
            version: 2,
            lock_time: PackedLockTime(0),
            input: vec![TxIn {
                previous_output: self.input.outpoint(),
                script_sig: self.input_script_sig.clone(),
                sequence: Sequence::MAX,
                witness: empty!(),
            }],
            output,
        }
    }

    /// Txid of the commitment, which is not changed by signing
    #[inline]
    pub fn txid(&self) -> Txid {
        self.unsigned_tx().txid()
    }
}
