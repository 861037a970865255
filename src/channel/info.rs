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


use bitcoin::{Address, Script};
use chrono::{DateTime, Utc};
use p2p::{ActiveChannelId, ChannelId, CommitmentId, PeerId, TempChannelId};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use super::{CommonParams, PeerParams};
use crate::config::DEFAULT_DELIVERY_SEQUENCE;
use crate::error::{Error, StateError, ValidationError};

/// Channel lifecycle: states of the channel state machine
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
#[repr(u8)]
pub enum Lifecycle {
    /// Funder sent `open_channel`
    #[display("PROPOSED")]
    Proposed,

    /// Fundee sent `accept_channel`; channel address is known
    #[display("ACCEPTED")]
    Accepted,

    /// Funding transaction is verified and recorded
    #[display("FUNDED")]
    Funded,

    /// Initial commitments are signed, channel accepts updates
    #[display("ACTIVE")]
    Active,

    /// Cooperative close requested by one of the peers
    #[display("CLOSING")]
    Closing,

    /// Channel non-operational and closed
    #[display("CLOSED")]
    Closed,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Proposed
    }
}

/// Reason for which a channel was closed
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Both peers agreed to close the channel
    #[display("cooperative")]
    Cooperative,

    /// Owner of a revoked commitment published it, and the counterparty
    /// claimed the funds with a breach remedy transaction
    #[display("breach({commitment})")]
    Breach { commitment: CommitmentId },
}

/// Side of a channel
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
pub enum Side {
    /// Funder of the channel
    #[display("A")]
    A,

    /// Fundee of the channel
    #[display("B")]
    B,
}

/// Channel record kept by the hub
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub temporary_channel_id: TempChannelId,

    /// Permanent id, assigned once the channel multisig address is known
    pub channel_id: Option<ChannelId>,

    /// Funder
    pub peer_a: PeerId,

    /// Fundee
    pub peer_b: PeerId,

    pub pubkey_a: PublicKey,

    pub pubkey_b: Option<PublicKey>,

    /// P2PKH address of the funder funding key
    pub address_a: Address,

    /// P2PKH address of the fundee funding key
    pub address_b: Option<Address>,

    /// 2-of-2 multisig address holding the channel funds
    pub channel_address: Option<Address>,

    pub redeem_script: Option<Script>,

    /// Omni property id of the channel asset
    pub property_id: u32,

    pub funding_amount: u64,

    /// Part of the funding initially owned by the fundee
    pub push_amount: u64,

    pub common_params: CommonParams,

    /// Terms requested by the funder
    pub params_a: PeerParams,

    /// Terms requested by the fundee
    pub params_b: Option<PeerParams>,

    pub lifecycle: Lifecycle,

    pub close_initiator: Option<PeerId>,

    pub close_reason: Option<CloseReason>,

    pub created_at: DateTime<Utc>,

    pub edited_at: DateTime<Utc>,
}

impl ChannelInfo {
    /// Channel id which is used to refer the channel in errors and logs
    #[inline]
    pub fn active_channel_id(&self) -> ActiveChannelId {
        self.channel_id
            .map(ActiveChannelId::from)
            .unwrap_or_else(|| self.temporary_channel_id.into())
    }

    pub fn channel_id(&self) -> Result<ChannelId, StateError> {
        self.channel_id
            .ok_or_else(|| StateError::NoChannelId(self.active_channel_id()))
    }

    pub fn channel_address(&self) -> Result<&Address, StateError> {
        self.channel_address
            .as_ref()
            .ok_or_else(|| StateError::NoChannelId(self.active_channel_id()))
    }

    pub fn redeem_script(&self) -> Result<&Script, StateError> {
        self.redeem_script
            .as_ref()
            .ok_or_else(|| StateError::NoChannelId(self.active_channel_id()))
    }

    /// Detects on which side of the channel the peer is
    pub fn side(&self, peer: &PeerId) -> Result<Side, ValidationError> {
        if *peer == self.peer_a {
            Ok(Side::A)
        } else if *peer == self.peer_b {
            Ok(Side::B)
        } else {
            Err(ValidationError::NotParticipant(peer.clone()))
        }
    }

    #[inline]
    pub fn is_participant(&self, peer: &PeerId) -> bool {
        self.side(peer).is_ok()
    }

    pub fn counterparty(
        &self,
        peer: &PeerId,
    ) -> Result<&PeerId, ValidationError> {
        Ok(match self.side(peer)? {
            Side::A => &self.peer_b,
            Side::B => &self.peer_a,
        })
    }

    /// Funding public key of a channel peer
    pub fn pubkey_of(&self, peer: &PeerId) -> Result<PublicKey, Error> {
        match self.side(peer)? {
            Side::A => Ok(self.pubkey_a),
            Side::B => self.pubkey_b.ok_or_else(|| {
                StateError::NoChannelId(self.active_channel_id()).into()
            }),
        }
    }

    /// Funding address of a channel peer
    pub fn address_of(&self, peer: &PeerId) -> Result<&Address, Error> {
        match self.side(peer)? {
            Side::A => Ok(&self.address_a),
            Side::B => self.address_b.as_ref().ok_or_else(|| {
                StateError::NoChannelId(self.active_channel_id()).into()
            }),
        }
    }

    /// Relative lock of revocable delivery transactions of commitments owned
    /// by `owner`, as requested by the counterparty
    pub fn to_self_delay(&self, owner: &PeerId) -> u16 {
        let delay = match self.side(owner) {
            Ok(Side::A) => self.params_b.map(|params| params.to_self_delay),
            Ok(Side::B) => Some(self.params_a.to_self_delay),
            Err(_) => None,
        };
        match delay {
            Some(delay) if delay > 0 => delay,
            _ => DEFAULT_DELIVERY_SEQUENCE,
        }
    }

    /// Checks that the channel is in one of the required states
    pub fn require(
        &self,
        required: &'static [Lifecycle],
    ) -> Result<(), StateError> {
        if required.contains(&self.lifecycle) {
            Ok(())
        } else {
            Err(StateError::LifecycleMismatch {
                channel: self.active_channel_id(),
                current: self.lifecycle,
                required,
            })
        }
    }

    pub(super) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
        self.edited_at = Utc::now();
    }
}
