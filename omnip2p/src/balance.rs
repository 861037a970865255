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

use bitcoin::Address;
use secp256k1::ecdsa::Signature;
use secp256k1::Message;
use serde::{Deserialize, Serialize};

use crate::{tagged_message, ChannelId, PeerId};

/// Signed request for the balance of the requester side of a channel
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("get_balance_request({channel_id}, {property_id}, {who}, ...)")]
pub struct GetBalanceRequest {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Channel multisig address
    pub p2sh_address: Address,

    /// Omni property id of the channel asset
    pub property_id: u32,

    /// Requesting peer
    pub who: PeerId,

    /// Requester signature over the query parameters
    pub signature: Signature,
}

impl GetBalanceRequest {
    /// Message which must be signed by the requester
    pub fn signing_message(&self) -> Message {
        tagged_message(
            "get_balance_request",
            format!(
                "{}:{}:{}:{}",
                self.channel_id, self.p2sh_address, self.property_id, self.who
            ),
        )
    }
}

/// Balance of the requester side of a channel
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("get_balance_respond({channel_id}, {property_id}, {balance}, ...)")]
pub struct GetBalanceRespond {
    /// The channel ID
    pub channel_id: ChannelId,

    /// Omni property id of the channel asset
    pub property_id: u32,

    /// Name of the asset
    pub name: String,

    /// Funds of the requester which are not locked in HTLCs
    pub balance: u64,

    /// Funds of the requester locked in HTLCs
    pub reserved: u64,

    /// Funds of the requester frozen by the protocol
    pub frozen: u64,
}
