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


//! Typed interface to the base chain node with Omni layer support

mod rpc;

pub use rpc::{RpcChain, RpcTransport};

use bitcoin::{Address, Script, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey};

/// Failures of the chain node calls
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ChainError {
    /// chain node call `{call}` failed: {details}
    Rpc { call: &'static str, details: String },

    /// chain node returned malformed response to `{call}`: field `{field}`
    /// is missing or invalid
    Malformed {
        call: &'static str,
        field: &'static str,
    },
}

/// 2-of-2 multisig P2SH-wrapped P2WSH address with its witness script
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{address}")]
pub struct MultisigInfo {
    pub address: Address,
    pub redeem_script: Script,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{address}")]
pub struct AddressInfo {
    pub address: Address,
    pub script_pubkey: Script,
}

/// Previous output spent by a decoded transaction input
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[display("{txid}:{vout}")]
pub struct TxInputRef {
    pub txid: Txid,
    pub vout: u32,
}

/// Output of a decoded transaction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TxOutputInfo {
    pub n: u32,

    /// Value in satoshis
    pub value: u64,

    /// Addresses reported by the node for the output script
    pub addresses: Vec<String>,

    pub script_pubkey: Script,
}

impl TxOutputInfo {
    /// Detects whether the output pays to the address
    pub fn pays(&self, address: &Address) -> bool {
        self.script_pubkey == address.script_pubkey()
            || self
                .addresses
                .iter()
                .any(|addr| *addr == address.to_string())
    }
}

/// Decoded base chain transaction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DecodedTx {
    pub txid: Txid,
    pub inputs: Vec<TxInputRef>,
    pub outputs: Vec<TxOutputInfo>,
}

impl DecodedTx {
    /// Outputs paying to the address, in the transaction order
    pub fn outputs_paying<'tx>(
        &'tx self,
        address: &'tx Address,
    ) -> impl Iterator<Item = &'tx TxOutputInfo> + 'tx {
        self.outputs.iter().filter(move |out| out.pays(address))
    }

    #[inline]
    pub fn output(&self, vout: u32) -> Option<&TxOutputInfo> {
        self.outputs.iter().find(|out| out.n == vout)
    }
}

/// Omni layer asset transfer record carried by a funding transaction
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{txid}: {amount} of #{property_id}")]
pub struct AssetTransfer {
    pub txid: Txid,
    pub sending_address: String,
    pub reference_address: String,

    /// Amount in the smallest asset units
    pub amount: u64,

    pub property_id: u32,
}

/// Omni layer asset (property) information
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("#{property_id} {name}")]
pub struct PropertyInfo {
    pub property_id: u32,
    pub name: String,
    pub divisible: bool,
}

/// Base chain node with Omni layer support. Calls are blocking and are never
/// retried by the channel core.
pub trait ChainService: Send + Sync {
    /// Derives 2-of-2 multisig P2SH address of the public keys
    fn derive_multisig(
        &self,
        pubkeys: &[PublicKey],
    ) -> Result<MultisigInfo, ChainError>;

    fn address_info(&self, address: &Address)
        -> Result<AddressInfo, ChainError>;

    fn decode_transaction(&self, hex: &str) -> Result<DecodedTx, ChainError>;

    /// Decodes Omni layer asset transfer record of a transaction
    fn decode_asset_transfer(
        &self,
        hex: &str,
    ) -> Result<AssetTransfer, ChainError>;

    /// Validates address string; returns `None` for addresses the node
    /// considers invalid
    fn validate_address(
        &self,
        address: &str,
    ) -> Result<Option<Address>, ChainError>;

    /// Returns hex-encoded raw transaction
    fn transaction_by_id(&self, txid: Txid) -> Result<String, ChainError>;

    fn verify_signature(
        &self,
        message: &Message,
        signature: &Signature,
        pubkey: &PublicKey,
    ) -> Result<bool, ChainError>;

    fn property(&self, property_id: u32) -> Result<PropertyInfo, ChainError>;
}
