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


use std::str::FromStr;

use bitcoin::hashes::hex::{FromHex, ToHex};
use bitcoin::{Address, Amount, Script, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SECP256K1};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    AddressInfo, AssetTransfer, ChainError, ChainService, DecodedTx,
    MultisigInfo, PropertyInfo, TxInputRef, TxOutputInfo,
};

/// Number of decimal places of divisible Omni layer assets
const OMNI_DIVISIBLE_PRECISION: usize = 8;

/// JSON-RPC connection to the chain node
pub trait RpcTransport: Send + Sync {
    /// Performs the call returning `result` field of the response or the
    /// error message
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, String>;
}

/// [`ChainService`] implementation over JSON-RPC interface of Omni Core node
pub struct RpcChain<T>
where
    T: RpcTransport,
{
    transport: T,
}

#[derive(Deserialize)]
struct RawMultisig {
    address: String,
    #[serde(rename = "redeemScript")]
    redeem_script: String,
}

#[derive(Deserialize)]
struct RawAddressInfo {
    address: String,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
}

#[derive(Deserialize)]
struct RawTx {
    txid: String,
    vin: Vec<RawTxIn>,
    vout: Vec<RawTxOut>,
}

#[derive(Deserialize)]
struct RawTxIn {
    txid: Option<String>,
    vout: Option<u32>,
}

#[derive(Deserialize)]
struct RawTxOut {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: RawScriptPubkey,
}

#[derive(Deserialize)]
struct RawScriptPubkey {
    hex: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct RawAssetTransfer {
    txid: String,
    #[serde(rename = "sendingaddress")]
    sending_address: String,
    #[serde(rename = "referenceaddress", default)]
    reference_address: Option<String>,
    #[serde(rename = "propertyid")]
    property_id: u32,
    amount: String,
    divisible: bool,
}

#[derive(Deserialize)]
struct RawValidation {
    #[serde(rename = "isvalid")]
    is_valid: bool,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
struct RawProperty {
    #[serde(rename = "propertyid")]
    property_id: u32,
    name: String,
    divisible: bool,
}

impl<T> RpcChain<T>
where
    T: RpcTransport,
{
    pub fn with(transport: T) -> Self {
        RpcChain { transport }
    }

    fn call<R>(
        &self,
        call: &'static str,
        params: Vec<Value>,
    ) -> Result<R, ChainError>
    where
        R: DeserializeOwned,
    {
        trace!("Calling chain node `{}` with {:?}", call, params);
        let value = self
            .transport
            .call(call, params)
            .map_err(|details| ChainError::Rpc { call, details })?;
        serde_json::from_value(value).map_err(|err| {
            debug!("Malformed `{}` response: {}", call, err);
            ChainError::Malformed {
                call,
                field: "result",
            }
        })
    }
}

fn parse_address(
    call: &'static str,
    field: &'static str,
    s: &str,
) -> Result<Address, ChainError> {
    Address::from_str(s).map_err(|_| ChainError::Malformed { call, field })
}

fn parse_script(
    call: &'static str,
    field: &'static str,
    s: &str,
) -> Result<Script, ChainError> {
    Vec::<u8>::from_hex(s)
        .map(Script::from)
        .map_err(|_| ChainError::Malformed { call, field })
}

fn parse_txid(
    call: &'static str,
    field: &'static str,
    s: &str,
) -> Result<Txid, ChainError> {
    Txid::from_str(s).map_err(|_| ChainError::Malformed { call, field })
}

/// Parses Omni layer amount string into the smallest asset units
fn parse_omni_amount(s: &str, divisible: bool) -> Option<u64> {
    if !divisible {
        return s.parse().ok();
    }
    let (int, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > OMNI_DIVISIBLE_PRECISION
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let frac = format!("{:0<width$}", frac, width = OMNI_DIVISIBLE_PRECISION);
    int.parse::<u64>()
        .ok()?
        .checked_mul(10u64.pow(OMNI_DIVISIBLE_PRECISION as u32))?
        .checked_add(frac.parse().ok()?)
}

impl<T> ChainService for RpcChain<T>
where
    T: RpcTransport,
{
    fn derive_multisig(
        &self,
        pubkeys: &[PublicKey],
    ) -> Result<MultisigInfo, ChainError> {
        const CALL: &str = "createmultisig";
        let keys: Vec<String> =
            pubkeys.iter().map(|pk| pk.serialize().to_hex()).collect();
        let raw: RawMultisig = self.call(CALL, vec![
            json!(2),
            json!(keys),
            json!("p2sh-segwit"),
        ])?;
        let address = parse_address(CALL, "address", &raw.address)?;
        let redeem_script =
            parse_script(CALL, "redeemScript", &raw.redeem_script)?;
        if Address::p2shwsh(&redeem_script, address.network) != address {
            return Err(ChainError::Malformed {
                call: CALL,
                field: "address",
            });
        }
        Ok(MultisigInfo {
            address,
            redeem_script,
        })
    }

    fn address_info(
        &self,
        address: &Address,
    ) -> Result<AddressInfo, ChainError> {
        const CALL: &str = "getaddressinfo";
        let raw: RawAddressInfo =
            self.call(CALL, vec![json!(address.to_string())])?;
        Ok(AddressInfo {
            address: parse_address(CALL, "address", &raw.address)?,
            script_pubkey: parse_script(
                CALL,
                "scriptPubKey",
                &raw.script_pubkey,
            )?,
        })
    }

    fn decode_transaction(&self, hex: &str) -> Result<DecodedTx, ChainError> {
        const CALL: &str = "decoderawtransaction";
        let raw: RawTx = self.call(CALL, vec![json!(hex)])?;
        let inputs = raw
            .vin
            .iter()
            .map(|vin| match (&vin.txid, vin.vout) {
                (Some(txid), Some(vout)) => Ok(TxInputRef {
                    txid: parse_txid(CALL, "vin.txid", txid)?,
                    vout,
                }),
                _ => Err(ChainError::Malformed {
                    call: CALL,
                    field: "vin",
                }),
            })
            .collect::<Result<_, _>>()?;
        let outputs = raw
            .vout
            .into_iter()
            .map(|vout| {
                let value = Amount::from_btc(vout.value).map_err(|_| {
                    ChainError::Malformed {
                        call: CALL,
                        field: "vout.value",
                    }
                })?;
                let mut addresses = vout.script_pubkey.addresses;
                addresses.extend(vout.script_pubkey.address);
                Ok(TxOutputInfo {
                    n: vout.n,
                    value: value.to_sat(),
                    addresses,
                    script_pubkey: parse_script(
                        CALL,
                        "vout.scriptPubKey.hex",
                        &vout.script_pubkey.hex,
                    )?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(DecodedTx {
            txid: parse_txid(CALL, "txid", &raw.txid)?,
            inputs,
            outputs,
        })
    }

    fn decode_asset_transfer(
        &self,
        hex: &str,
    ) -> Result<AssetTransfer, ChainError> {
        const CALL: &str = "omni_decodetransaction";
        let raw: RawAssetTransfer = self.call(CALL, vec![json!(hex)])?;
        Ok(AssetTransfer {
            txid: parse_txid(CALL, "txid", &raw.txid)?,
            sending_address: raw.sending_address,
            reference_address: raw.reference_address.ok_or(
                ChainError::Malformed {
                    call: CALL,
                    field: "referenceaddress",
                },
            )?,
            amount: parse_omni_amount(&raw.amount, raw.divisible).ok_or(
                ChainError::Malformed {
                    call: CALL,
                    field: "amount",
                },
            )?,
            property_id: raw.property_id,
        })
    }

    fn validate_address(
        &self,
        address: &str,
    ) -> Result<Option<Address>, ChainError> {
        const CALL: &str = "validateaddress";
        let raw: RawValidation = self.call(CALL, vec![json!(address)])?;
        if !raw.is_valid {
            return Ok(None);
        }
        let address = raw.address.as_deref().unwrap_or(address);
        parse_address(CALL, "address", address).map(Some)
    }

    fn transaction_by_id(&self, txid: Txid) -> Result<String, ChainError> {
        self.call("getrawtransaction", vec![json!(txid.to_string())])
    }

    fn verify_signature(
        &self,
        message: &Message,
        signature: &Signature,
        pubkey: &PublicKey,
    ) -> Result<bool, ChainError> {
        Ok(SECP256K1.verify_ecdsa(message, signature, pubkey).is_ok())
    }

    fn property(&self, property_id: u32) -> Result<PropertyInfo, ChainError> {
        let raw: RawProperty =
            self.call("omni_getproperty", vec![json!(property_id)])?;
        Ok(PropertyInfo {
            property_id: raw.property_id,
            name: raw.name,
            divisible: raw.divisible,
        })
    }
}
