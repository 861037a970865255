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


use std::sync::Arc;

use bitcoin::{Address, Txid};
use chrono::{DateTime, Utc};
use p2p::{ChannelId, FundingSigned, PeerId};
use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use super::{ChannelInfo, Lifecycle};
use crate::chain::{AssetTransfer, ChainService, DecodedTx};
use crate::commitment::InputRef;
use crate::error::{Error, ValidationError};

/// Verified funding of a channel. Created once per channel and never
/// modified afterwards.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FundingTransaction {
    pub channel_id: ChannelId,

    pub txid: Txid,

    /// Index of the output paying to the channel address
    pub output_index: u32,

    pub property_id: u32,

    /// Funds of the funder
    pub amount_a: u64,

    /// Funds of the fundee
    pub amount_b: u64,

    /// Funder signature over `funding_created` terms
    pub funder_signature: Option<Signature>,

    pub created_at: DateTime<Utc>,
}

impl FundingTransaction {
    /// Total funded amount
    #[inline]
    pub fn amount(&self) -> u64 {
        self.amount_a + self.amount_b
    }

    /// Funding output as an input of the initial commitments
    #[inline]
    pub fn input(&self) -> InputRef {
        InputRef {
            txid: self.txid,
            vout: self.output_index,
            amount: self.amount(),
        }
    }
}

/// Funding transaction as decoded by the chain node
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FundingEvidence {
    /// Channel funded with the base chain asset
    Base(DecodedTx),

    /// Channel funded with Omni layer asset transfer
    Asset {
        transfer: AssetTransfer,
        tx: DecodedTx,
    },
}

/// Validates channel funding against the chain node
pub struct FundingCoordinator {
    chain: Arc<dyn ChainService>,
    base_property_id: u32,
}

impl FundingCoordinator {
    pub fn new(chain: Arc<dyn ChainService>, base_property_id: u32) -> Self {
        FundingCoordinator {
            chain,
            base_property_id,
        }
    }

    /// Decodes hex-encoded funding transaction of a channel with a given
    /// asset
    pub fn decode(
        &self,
        funding_tx_hex: &str,
        property_id: u32,
    ) -> Result<FundingEvidence, Error> {
        let tx = self.chain.decode_transaction(funding_tx_hex)?;
        if property_id == self.base_property_id {
            return Ok(FundingEvidence::Base(tx));
        }
        let transfer = self.chain.decode_asset_transfer(funding_tx_hex)?;
        if transfer.txid != tx.txid {
            return Err(ValidationError::Malformed {
                call: "omni_decodetransaction",
                field: "txid",
            }
            .into());
        }
        Ok(FundingEvidence::Asset { transfer, tx })
    }

    /// Spendable outputs of the transaction paying to the address
    pub fn outputs_paying(
        &self,
        decoded: &DecodedTx,
        address: &Address,
    ) -> Vec<InputRef> {
        decoded
            .outputs_paying(address)
            .map(|out| InputRef {
                txid: decoded.txid,
                vout: out.n,
                amount: out.value,
            })
            .collect()
    }

    /// Validates funding transaction provided by the funder, producing the
    /// funding record with the split of the funds between the peers
    pub fn validate_funding(
        &self,
        evidence: &FundingEvidence,
        channel: &ChannelInfo,
        funder: &PeerId,
    ) -> Result<FundingTransaction, Error> {
        channel.require(&[Lifecycle::Accepted])?;
        if *funder != channel.peer_a {
            return Err(ValidationError::WrongFunder(funder.clone()).into());
        }
        let channel_id = channel.channel_id()?;
        let channel_address = channel.channel_address()?;

        let (txid, output_index, amount) = match evidence {
            FundingEvidence::Base(tx) => {
                let input = tx.inputs.first().ok_or_else(|| {
                    ValidationError::WrongInput {
                        expected: channel.address_a.clone(),
                    }
                })?;
                let prev_hex = self.chain.transaction_by_id(input.txid)?;
                let prev = self.chain.decode_transaction(&prev_hex)?;
                if !prev
                    .output(input.vout)
                    .map(|out| out.pays(&channel.address_a))
                    .unwrap_or_default()
                {
                    return Err(ValidationError::WrongInput {
                        expected: channel.address_a.clone(),
                    }
                    .into());
                }
                let output = self.funding_output(tx, channel_address)?;
                (tx.txid, output.vout, output.amount)
            }
            FundingEvidence::Asset { transfer, tx } => {
                if transfer.sending_address != channel.address_a.to_string() {
                    return Err(ValidationError::WrongSender {
                        expected: channel.address_a.clone(),
                        found: transfer.sending_address.clone(),
                    }
                    .into());
                }
                if transfer.reference_address != channel_address.to_string() {
                    return Err(ValidationError::WrongReference {
                        expected: channel_address.clone(),
                        found: transfer.reference_address.clone(),
                    }
                    .into());
                }
                if transfer.property_id != channel.property_id {
                    return Err(ValidationError::WrongAsset {
                        expected: channel.property_id,
                        found: transfer.property_id,
                    }
                    .into());
                }
                let output = self.funding_output(tx, channel_address)?;
                (transfer.txid, output.vout, transfer.amount)
            }
        };

        if amount != channel.funding_amount {
            return Err(ValidationError::AmountMismatch {
                expected: channel.funding_amount,
                found: amount,
            }
            .into());
        }

        debug!(
            "Funding of channel {} is verified: {}:{} with {} of #{}",
            channel_id, txid, output_index, amount, channel.property_id
        );
        Ok(FundingTransaction {
            channel_id,
            txid,
            output_index,
            property_id: channel.property_id,
            amount_a: amount - channel.push_amount,
            amount_b: channel.push_amount,
            funder_signature: None,
            created_at: Utc::now(),
        })
    }

    fn funding_output(
        &self,
        tx: &DecodedTx,
        channel_address: &Address,
    ) -> Result<InputRef, ValidationError> {
        self.outputs_paying(tx, channel_address)
            .into_iter()
            .next()
            .ok_or_else(|| ValidationError::WrongOutput {
                expected: channel_address.clone(),
            })
    }

    /// Verifies `funding_signed` message of the fundee against the channel
    /// record and the verified funding
    pub fn verify_funding_signed(
        &self,
        channel: &ChannelInfo,
        funding_signed: &FundingSigned,
        funding: &FundingTransaction,
    ) -> Result<(), Error> {
        let channel_address = channel.channel_address()?;
        let fundee_pubkey = channel.pubkey_of(&channel.peer_b)?;
        if funding_signed.funder_pubkey != channel.pubkey_a {
            return Err(ValidationError::KeyMismatch {
                expected: channel.pubkey_a,
                found: funding_signed.funder_pubkey,
            }
            .into());
        }
        if funding_signed.fundee_pubkey != fundee_pubkey {
            return Err(ValidationError::KeyMismatch {
                expected: fundee_pubkey,
                found: funding_signed.fundee_pubkey,
            }
            .into());
        }
        if funding_signed.property_id != funding.property_id {
            return Err(ValidationError::WrongAsset {
                expected: funding.property_id,
                found: funding_signed.property_id,
            }
            .into());
        }
        if funding_signed.amount_a != funding.amount_a {
            return Err(ValidationError::AmountMismatch {
                expected: funding.amount_a,
                found: funding_signed.amount_a,
            }
            .into());
        }
        if funding_signed.amount_b != funding.amount_b {
            return Err(ValidationError::AmountMismatch {
                expected: funding.amount_b,
                found: funding_signed.amount_b,
            }
            .into());
        }

        if !self.chain.verify_signature(
            &funding_signed.signing_message(),
            &funding_signed.fundee_signature,
            &fundee_pubkey,
        )? {
            warn!(
                "Invalid fundee signature for the funding of channel {}",
                funding.channel_id
            );
            return Err(Error::Unauthorized(channel.peer_b.clone()));
        }

        if let Some(ref redeem_script) = funding_signed.redeem_script {
            if redeem_script != channel.redeem_script()? {
                return Err(ValidationError::RedeemScriptMismatch.into());
            }
            let derived =
                Address::p2shwsh(redeem_script, channel_address.network);
            if derived != *channel_address {
                return Err(ValidationError::ChannelAddressMismatch {
                    expected: channel_address.clone(),
                    found: derived,
                }
                .into());
            }
        }
        if let Some(ref address) = funding_signed.p2sh_address {
            if address != channel_address {
                return Err(ValidationError::ChannelAddressMismatch {
                    expected: channel_address.clone(),
                    found: address.clone(),
                }
                .into());
            }
        }
        if let Some(channel_id) = funding_signed.channel_id {
            if channel_id != funding.channel_id {
                return Err(ValidationError::ChannelIdMismatch {
                    expected: funding.channel_id,
                    found: channel_id,
                }
                .into());
            }
        }
        Ok(())
    }
}
