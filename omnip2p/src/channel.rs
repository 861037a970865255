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

use amplify::DumbDefault;
use bitcoin::hashes::Hash;
use bitcoin::{Address, BlockHash, Script};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey};
use serde::{Deserialize, Serialize};

use crate::{tagged_message, ChannelId, TempChannelId, USDT_PROPERTY_ID};

/// This message contains information about a funder and indicates its desire
/// to set up a new channel for a specific Omni asset. This is the first step
/// toward creating the funding transaction and both versions of the
/// commitment transaction.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display(
    "open_channel({chain_hash}, {temporary_channel_id}, {property_id}, \
     {funding_satoshis}, ...)"
)]
pub struct OpenChannel {
    /// The genesis hash of the blockchain where the channel is to be opened
    pub chain_hash: BlockHash,

    /// A temporary channel ID, until the channel multisig address is known
    pub temporary_channel_id: TempChannelId,

    /// Omni property id of the channel asset
    pub property_id: u32,

    /// The channel value, in the asset units
    pub funding_satoshis: u64,

    /// The amount to push to the counter-party as part of the open, in
    /// thousandths of the asset unit
    pub push_msat: u64,

    /// The threshold below which outputs on transactions broadcast by sender
    /// will be omitted
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// thousandths of the asset unit
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to keep
    /// in the channel
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in thousandths of the asset
    /// unit
    pub htlc_minimum_msat: u64,

    /// The fee rate per 1000-weight of sender generated transactions
    pub feerate_per_kw: u32,

    /// The number of blocks which the counterparty will have to wait to claim
    /// on-chain funds if they broadcast a commitment transaction
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by counterparty
    pub payment_point: PublicKey,

    /// Used to derive a payment key to sender for transactions broadcast by
    /// sender
    pub delayed_payment_basepoint: PublicKey,

    /// Used to derive an HTLC payment key to sender
    pub htlc_basepoint: PublicKey,
}

impl DumbDefault for OpenChannel {
    fn dumb_default() -> Self {
        OpenChannel {
            chain_hash: BlockHash::all_zeros(),
            temporary_channel_id: TempChannelId::dumb_default(),
            property_id: USDT_PROPERTY_ID,
            funding_satoshis: 0,
            push_msat: 0,
            dust_limit_satoshis: 0,
            max_htlc_value_in_flight_msat: 0,
            channel_reserve_satoshis: 0,
            htlc_minimum_msat: 0,
            feerate_per_kw: 0,
            to_self_delay: 0,
            max_accepted_htlcs: 0,
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_point: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
        }
    }
}

/// This message contains information about a fundee and indicates its
/// acceptance of the new channel. This is the second step toward creating
/// the funding transaction and both versions of the commitment transaction.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("accept_channel({temporary_channel_id}, ...)")]
pub struct AcceptChannel {
    /// A temporary channel ID, until the channel multisig address is known
    pub temporary_channel_id: TempChannelId,

    /// The threshold below which outputs on transactions broadcast by sender
    /// will be omitted
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// thousandths of the asset unit
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to keep
    /// in the channel
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in thousandths of the asset
    /// unit
    pub htlc_minimum_msat: u64,

    /// Minimum depth of the funding transaction before the channel is
    /// considered open
    pub minimum_depth: u32,

    /// The number of blocks which the counterparty will have to wait to claim
    /// on-chain funds if they broadcast a commitment transaction
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by counterparty
    pub payment_point: PublicKey,

    /// Used to derive a payment key to sender for transactions broadcast by
    /// sender
    pub delayed_payment_basepoint: PublicKey,

    /// Used to derive an HTLC payment key to sender
    pub htlc_basepoint: PublicKey,
}

impl DumbDefault for AcceptChannel {
    fn dumb_default() -> Self {
        AcceptChannel {
            temporary_channel_id: TempChannelId::dumb_default(),
            dust_limit_satoshis: 0,
            max_htlc_value_in_flight_msat: 0,
            channel_reserve_satoshis: 0,
            htlc_minimum_msat: 0,
            minimum_depth: 0,
            to_self_delay: 0,
            max_accepted_htlcs: 0,
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_point: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
        }
    }
}

/// This message announces the funding transaction which the funder has
/// created and broadcast to the channel multisig address.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display(
    "funding_created({temporary_channel_id}, {property_id}, {amount_a}, ...)"
)]
pub struct FundingCreated {
    /// A temporary channel ID, until the channel multisig address is known
    pub temporary_channel_id: TempChannelId,

    /// Funding public key of the funder
    pub funder_pubkey: PublicKey,

    /// Omni property id of the funded asset
    pub property_id: u32,

    /// Amount of the asset locked in the channel by the funder
    pub amount_a: u64,

    /// Hex-encoded funding transaction
    pub funding_tx_hex: String,

    /// Funder signature over the funding terms; used as the counterparty
    /// signature for the first commitment transaction of the fundee
    pub funder_signature: Signature,
}

impl FundingCreated {
    /// Message which must be signed by the funder
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "funding_created",
            format!(
                "{}:{}:{}:{}:{}",
                self.temporary_channel_id,
                self.funder_pubkey,
                self.property_id,
                self.amount_a,
                self.funding_tx_hex
            ),
        )
    }
}

/// This message gives the funder the signature it needs for the first
/// commitment transaction, so it can rely on the funds to be redeemable.
///
/// This message introduces the `channel_id` to identify the channel. The
/// fundee may leave the redeem script, P2SH address and channel id empty;
/// they are filled in when the message is relayed to the funder.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("funding_signed({temporary_channel_id}, {property_id}, ...)")]
pub struct FundingSigned {
    /// A temporary channel ID, until the channel multisig address is known
    pub temporary_channel_id: TempChannelId,

    /// Funding public key of the funder
    pub funder_pubkey: PublicKey,

    /// Omni property id of the funded asset
    pub property_id: u32,

    /// Funder part of the channel funds
    pub amount_a: u64,

    /// Funding public key of the fundee
    pub fundee_pubkey: PublicKey,

    /// Fundee part of the channel funds (pushed by the funder)
    pub amount_b: u64,

    /// Fundee signature over the funding terms
    pub fundee_signature: Signature,

    /// Redeem script of the channel 2-of-2 multisig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<Script>,

    /// P2SH address of the channel 2-of-2 multisig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2sh_address: Option<Address>,

    /// Permanent channel id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
}

impl FundingSigned {
    /// Message which must be signed by the fundee
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "funding_signed",
            format!(
                "{}:{}:{}:{}:{}:{}",
                self.temporary_channel_id,
                self.funder_pubkey,
                self.property_id,
                self.amount_a,
                self.fundee_pubkey,
                self.amount_b
            ),
        )
    }
}

/// Cooperative channel close request. Sent by the initiator and confirmed by
/// the counterparty with the same message.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("close_channel({channel_id}, ...)")]
pub struct CloseChannel {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Script which should receive the sender part of the funds
    pub script_pubkey: Script,

    /// Signature of the sender over the close request
    pub signature: Signature,
}

impl CloseChannel {
    /// Message which must be signed by the sender
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "close_channel",
            format!("{}:{:x}", self.channel_id, self.script_pubkey),
        )
    }
}
