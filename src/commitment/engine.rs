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

use chrono::Utc;
use p2p::{ChannelId, CommitmentId, PeerId};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::{
    nested_script_sig, CommitmentState, CommitmentTransaction, HtlcOutput,
    InputSource, Split,
};
use crate::chain::ChainService;
use crate::channel::{ChannelInfo, Lifecycle};
use crate::error::{Error, StateError, ValidationError};
use crate::store::PersistenceStore;

/// Builds commitment transactions and tracks their signing. Never discloses
/// revocation secrets.
pub struct CommitmentEngine {
    chain: Arc<dyn ChainService>,
    store: Arc<dyn PersistenceStore>,
    max_fee: u64,
}

impl CommitmentEngine {
    pub fn new(
        chain: Arc<dyn ChainService>,
        store: Arc<dyn PersistenceStore>,
        max_fee: u64,
    ) -> Self {
        CommitmentEngine {
            chain,
            store,
            max_fee,
        }
    }

    /// Constructs new commitment of the `owner`, persisting it in the
    /// [`CommitmentState::Created`] state
    pub fn build_commitment(
        &self,
        owner: &PeerId,
        channel: &ChannelInfo,
        source: InputSource,
        split: Split,
    ) -> Result<CommitmentTransaction, Error> {
        channel.require(&[Lifecycle::Active])?;
        let counterparty = channel.counterparty(owner)?;
        let channel_id = channel.channel_id()?;

        let latest_signed = self.store.latest_commitment(
            channel_id,
            owner,
            CommitmentState::Signed,
        )?;
        let (input, supersedes, number) = match source {
            InputSource::Funding(funding) => {
                if latest_signed.is_some() {
                    return Err(StateError::FundingInputUsed {
                        channel: channel_id,
                        owner: owner.clone(),
                    }
                    .into());
                }
                if funding.channel_id != channel_id {
                    return Err(ValidationError::ChannelIdMismatch {
                        expected: channel_id,
                        found: funding.channel_id,
                    }
                    .into());
                }
                (funding.input(), None, 0)
            }
            InputSource::Previous(prev_id) => match latest_signed {
                Some(prev) if prev.id == prev_id => {
                    (prev.input, Some(prev_id), prev.number + 1)
                }
                _ => return Err(StateError::StaleInput(prev_id).into()),
            },
        };
        if let Some(pending) = self.store.latest_commitment(
            channel_id,
            owner,
            CommitmentState::Created,
        )? {
            return Err(StateError::PendingCommitment(pending.id).into());
        }

        let outputs = split
            .to_rsmc
            .checked_add(split.to_other)
            .and_then(|sum| sum.checked_add(split.to_htlc))
            .unwrap_or(u64::MAX);
        if outputs > input.amount {
            return Err(ValidationError::Overspend {
                input: input.amount,
                outputs,
            }
            .into());
        }
        let fee = input.amount - outputs;
        if fee > self.max_fee {
            return Err(ValidationError::FeeTooHigh {
                fee,
                max: self.max_fee,
            }
            .into());
        }
        if (split.to_htlc > 0) != split.htlc_pubkey.is_some() {
            return Err(ValidationError::HtlcMismatch.into());
        }

        self.check_key_reuse(channel, channel_id, &split)?;

        let counterparty_key = channel.pubkey_of(counterparty)?;
        let rsmc = self
            .chain
            .derive_multisig(&[split.rsmc_pubkey, counterparty_key])?;
        let rsmc_info = self.chain.address_info(&rsmc.address)?;
        let htlc = match split.htlc_pubkey {
            Some(pubkey) => {
                let multisig =
                    self.chain.derive_multisig(&[pubkey, counterparty_key])?;
                let info = self.chain.address_info(&multisig.address)?;
                Some(HtlcOutput {
                    pubkey,
                    address: multisig.address,
                    redeem_script: multisig.redeem_script,
                    script_pubkey: info.script_pubkey,
                })
            }
            None => None,
        };
        let other = self
            .chain
            .address_info(channel.address_of(counterparty)?)?;

        let now = Utc::now();
        let commitment = CommitmentTransaction {
            id: CommitmentId::with(
                channel_id,
                owner,
                number,
                &split.rsmc_pubkey,
            ),
            channel_id,
            property_id: channel.property_id,
            owner: owner.clone(),
            number,
            input,
            input_script_sig: nested_script_sig(channel.redeem_script()?),
            supersedes,
            rsmc_pubkey: split.rsmc_pubkey,
            rsmc_address: rsmc.address,
            rsmc_redeem_script: rsmc.redeem_script,
            rsmc_script_pubkey: rsmc_info.script_pubkey,
            htlc,
            other_address: other.address,
            other_script_pubkey: other.script_pubkey,
            amount_to_rsmc: split.to_rsmc,
            amount_to_other: split.to_other,
            amount_to_htlc: split.to_htlc,
            counterparty_signature: None,
            state: CommitmentState::Created,
            created_at: now,
            edited_at: now,
        };
        self.store.upsert_commitment(&commitment)?;
        debug!(
            "Commitment #{} {} of {} in channel {} created: {} to RSMC, {} to \
             other, {} to HTLC",
            number,
            commitment.id,
            owner,
            channel_id,
            split.to_rsmc,
            split.to_other,
            split.to_htlc
        );
        Ok(commitment)
    }

    fn check_key_reuse(
        &self,
        channel: &ChannelInfo,
        channel_id: ChannelId,
        split: &Split,
    ) -> Result<(), Error> {
        let new_keys: Vec<PublicKey> = Some(split.rsmc_pubkey)
            .into_iter()
            .chain(split.htlc_pubkey)
            .collect();
        let mut used: Vec<PublicKey> = self
            .store
            .commitments(channel_id)?
            .iter()
            .flat_map(CommitmentTransaction::temp_pubkeys)
            .collect();
        used.push(channel.pubkey_a);
        used.extend(channel.pubkey_b);
        if split.htlc_pubkey == Some(split.rsmc_pubkey) {
            used.push(split.rsmc_pubkey);
        }
        match new_keys.into_iter().find(|key| used.contains(key)) {
            Some(key) => {
                error!(
                    "Temporary key {} is reused in channel {}; rejecting the \
                     commitment",
                    key, channel_id
                );
                Err(Error::KeyReuse {
                    key,
                    channel: channel_id,
                })
            }
            None => Ok(()),
        }
    }

    fn transit(
        &self,
        id: CommitmentId,
        required: CommitmentState,
        f: impl FnOnce(&mut CommitmentTransaction),
    ) -> Result<CommitmentTransaction, Error> {
        let mut commitment = self
            .store
            .commitment(id)?
            .ok_or(StateError::UnknownCommitment(id))?;
        if commitment.state != required {
            return Err(StateError::CommitmentStateMismatch {
                id,
                current: commitment.state,
                required,
            }
            .into());
        }
        f(&mut commitment);
        commitment.edited_at = Utc::now();
        self.store.upsert_commitment(&commitment)?;
        debug!("Commitment {} is {}", id, commitment.state);
        Ok(commitment)
    }

    /// Records the counterparty signature of the commitment
    pub fn mark_signed(
        &self,
        id: CommitmentId,
        counterparty_signature: Signature,
    ) -> Result<CommitmentTransaction, Error> {
        self.transit(id, CommitmentState::Created, |commitment| {
            commitment.counterparty_signature = Some(counterparty_signature);
            commitment.state = CommitmentState::Signed;
        })
    }

    /// Abandons commitment which is not signed yet
    pub fn cancel(
        &self,
        id: CommitmentId,
    ) -> Result<CommitmentTransaction, Error> {
        self.transit(id, CommitmentState::Created, |commitment| {
            commitment.state = CommitmentState::Cancelled
        })
    }

    /// Finalizes all commitments of the closed channel
    pub fn close_all(&self, channel_id: ChannelId) -> Result<(), Error> {
        for mut commitment in self.store.commitments(channel_id)? {
            commitment.state = match commitment.state {
                CommitmentState::Signed => CommitmentState::Closed,
                CommitmentState::Created => CommitmentState::Cancelled,
                _ => continue,
            };
            commitment.edited_at = Utc::now();
            self.store.upsert_commitment(&commitment)?;
        }
        debug!("Commitments of channel {} are closed", channel_id);
        Ok(())
    }

    /// The latest signed commitment of the owner
    pub fn latest_signed(
        &self,
        channel_id: ChannelId,
        owner: &PeerId,
    ) -> Result<CommitmentTransaction, Error> {
        self.store
            .latest_commitment(channel_id, owner, CommitmentState::Signed)?
            .ok_or_else(|| {
                StateError::NoSignedCommitment {
                    channel: channel_id,
                    owner: owner.clone(),
                }
                .into()
            })
    }
}
