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

use bitcoin::blockdata::constants::genesis_block;
use bitcoin::{BlockHash, Network};
use p2p::{PeerId, BTC_PROPERTY_ID};
use serde::{Deserialize, Serialize};

use crate::channel::Policy;

/// Default relative lock of revocable delivery transactions, in blocks, used
/// when the channel peers did not negotiate `to_self_delay`
pub const DEFAULT_DELIVERY_SEQUENCE: u16 = 1000;

/// Default maximum for the commitment transaction fee, in asset units
pub const DEFAULT_MAX_COMMITMENT_FEE: u64 = 1000;

/// Configuration of the channel hub
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of the hub used as a sender of its own replies
    pub node_id: PeerId,

    /// Bitcoin network the channels operate on
    pub network: Network,

    /// Policy to validate channel terms proposed by the peers
    pub policy: Policy,

    /// Maximum difference between the commitment input and outputs
    pub max_commitment_fee: u64,

    /// Property id funded with plain bitcoin transactions instead of Omni
    /// asset transfers
    pub base_property_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: PeerId::from("omnibolt-hub"),
            network: Network::Testnet,
            policy: Policy::default(),
            max_commitment_fee: DEFAULT_MAX_COMMITMENT_FEE,
            base_property_id: BTC_PROPERTY_ID,
        }
    }
}

impl Config {
    /// Constructs default configuration for a specific network
    pub fn with(network: Network) -> Self {
        Config {
            network,
            ..default!()
        }
    }

    /// Reads configuration from JSON; missing fields take default values
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Genesis block hash of the configured network
    #[inline]
    pub fn chain_hash(&self) -> BlockHash {
        genesis_block(self.network).block_hash()
    }
}
