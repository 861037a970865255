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


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bitcoin::{Address, BlockHash};
use chrono::Utc;
use p2p::{
    AcceptChannel, ActiveChannelId, ChannelId, OpenChannel, PeerId,
    TempChannelId,
};

use super::{
    ChannelInfo, CloseReason, CommonParams, FundingTransaction, Lifecycle,
    Policy,
};
use crate::chain::MultisigInfo;
use crate::error::{Error, StateError, ValidationError};
use crate::store::PersistenceStore;

/// Terms of the fundee accepting channel proposal
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Acceptance {
    /// Peer which accepts the channel
    pub peer_b: PeerId,

    pub accept_channel: AcceptChannel,

    /// P2PKH address of the fundee funding key
    pub address_b: Address,

    /// Channel multisig of the funder and fundee funding keys
    pub multisig: MultisigInfo,
}

/// Registry of the channels driving their lifecycle state machine. All
/// transitions are serialized and persisted after each step.
pub struct ChannelRegistry {
    store: Arc<dyn PersistenceStore>,
    chain_hash: BlockHash,
    policy: Policy,
    lock: Mutex<()>,
}

impl ChannelRegistry {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        chain_hash: BlockHash,
        policy: Policy,
    ) -> Self {
        ChannelRegistry {
            store,
            chain_hash,
            policy,
            lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn serialize(&self) -> MutexGuard<()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Channel by its temporary or permanent id
    pub fn channel(
        &self,
        id: impl Into<ActiveChannelId>,
    ) -> Result<ChannelInfo, Error> {
        let id = id.into();
        self.store
            .channel(id)?
            .ok_or_else(|| StateError::UnknownChannel(id).into())
    }

    /// Channel which is being established
    pub fn draft(&self, temp_id: TempChannelId) -> Result<ChannelInfo, Error> {
        let channel = self.channel(temp_id)?;
        channel.require(&[
            Lifecycle::Proposed,
            Lifecycle::Accepted,
            Lifecycle::Funded,
        ])?;
        Ok(channel)
    }

    /// Channel which accepts commitment updates
    pub fn active(&self, channel_id: ChannelId) -> Result<ChannelInfo, Error> {
        let channel = self.channel(channel_id)?;
        channel.require(&[Lifecycle::Active])?;
        Ok(channel)
    }

    /// Registers channel proposed by the funder `peer_a` to the fundee
    /// `peer_b`
    pub fn propose_open(
        &self,
        peer_a: PeerId,
        peer_b: PeerId,
        open_channel: &OpenChannel,
        address_a: Address,
    ) -> Result<ChannelInfo, Error> {
        if peer_a == peer_b {
            return Err(ValidationError::SamePeers(peer_a).into());
        }
        if open_channel.chain_hash != self.chain_hash {
            return Err(ValidationError::ChainMismatch {
                expected: self.chain_hash,
                found: open_channel.chain_hash,
            }
            .into());
        }
        let params_a = self.policy.validate_inbound(open_channel)?;
        let push_amount = open_channel.push_msat / 1000;
        if push_amount > open_channel.funding_satoshis {
            return Err(ValidationError::InsufficientFunds {
                available: open_channel.funding_satoshis,
                requested: push_amount,
            }
            .into());
        }

        let temp_id = open_channel.temporary_channel_id;
        let _guard = self.serialize();
        if self.store.channel(temp_id.into())?.is_some() {
            return Err(StateError::DuplicateChannel(temp_id.into()).into());
        }
        let now = Utc::now();
        let channel = ChannelInfo {
            temporary_channel_id: temp_id,
            channel_id: None,
            peer_a,
            peer_b,
            pubkey_a: open_channel.funding_pubkey,
            pubkey_b: None,
            address_a,
            address_b: None,
            channel_address: None,
            redeem_script: None,
            property_id: open_channel.property_id,
            funding_amount: open_channel.funding_satoshis,
            push_amount,
            common_params: CommonParams::with(
                open_channel,
                self.policy.minimum_depth,
            ),
            params_a,
            params_b: None,
            lifecycle: Lifecycle::Proposed,
            close_initiator: None,
            close_reason: None,
            created_at: now,
            edited_at: now,
        };
        self.store.upsert_channel(&channel)?;
        info!(
            "Channel {} proposed by {} to {}: {} of #{}",
            temp_id,
            channel.peer_a,
            channel.peer_b,
            channel.funding_amount,
            channel.property_id
        );
        Ok(channel)
    }

    /// Accepts proposed channel, assigning it permanent id derived from the
    /// channel multisig address
    pub fn accept(
        &self,
        temp_id: TempChannelId,
        acceptance: Acceptance,
    ) -> Result<ChannelInfo, Error> {
        let _guard = self.serialize();
        let mut channel = self.channel(temp_id)?;
        channel.require(&[Lifecycle::Proposed])?;
        if acceptance.peer_b != channel.peer_b {
            return Err(Error::Unauthorized(acceptance.peer_b));
        }
        let params_b = self
            .policy
            .confirm_outbound(channel.params_a, &acceptance.accept_channel)?;

        let channel_id = ChannelId::with(&acceptance.multisig.address);
        if self.store.channel(channel_id.into())?.is_some() {
            return Err(StateError::DuplicateChannel(channel_id.into()).into());
        }

        channel.channel_id = Some(channel_id);
        channel.pubkey_b = Some(acceptance.accept_channel.funding_pubkey);
        channel.address_b = Some(acceptance.address_b);
        channel.channel_address = Some(acceptance.multisig.address);
        channel.redeem_script = Some(acceptance.multisig.redeem_script);
        channel.params_b = Some(params_b);
        channel.common_params.minimum_depth =
            acceptance.accept_channel.minimum_depth;
        channel.set_lifecycle(Lifecycle::Accepted);
        self.store.upsert_channel(&channel)?;
        info!("Channel {} accepted as {}", temp_id, channel_id);
        Ok(channel)
    }

    /// Records verified funding of the channel
    pub fn record_funding(
        &self,
        channel_id: ChannelId,
        funding: FundingTransaction,
    ) -> Result<ChannelInfo, Error> {
        let _guard = self.serialize();
        let mut channel = self.channel(channel_id)?;
        if self.store.funding(channel_id)?.is_some() {
            return Err(StateError::FundingRecorded(channel_id).into());
        }
        channel.require(&[Lifecycle::Accepted])?;
        if funding.channel_id != channel_id {
            return Err(ValidationError::ChannelIdMismatch {
                expected: channel_id,
                found: funding.channel_id,
            }
            .into());
        }
        self.store.upsert_funding(&funding)?;
        channel.set_lifecycle(Lifecycle::Funded);
        self.store.upsert_channel(&channel)?;
        info!(
            "Channel {} is funded with {}:{}",
            channel_id, funding.txid, funding.output_index
        );
        Ok(channel)
    }

    /// Marks funded channel as active once its initial commitments are
    /// signed
    pub fn activate(
        &self,
        channel_id: ChannelId,
    ) -> Result<ChannelInfo, Error> {
        self.transit(channel_id.into(), &[Lifecycle::Funded], |channel| {
            channel.set_lifecycle(Lifecycle::Active)
        })
    }

    /// Registers cooperative close request of one of the peers
    pub fn begin_closing(
        &self,
        channel_id: ChannelId,
        initiator: &PeerId,
    ) -> Result<ChannelInfo, Error> {
        self.transit(channel_id.into(), &[Lifecycle::Active], |channel| {
            channel.close_initiator = Some(initiator.clone());
            channel.set_lifecycle(Lifecycle::Closing)
        })
    }

    /// Closes the channel; possible from any state except closed
    pub fn close(
        &self,
        id: ActiveChannelId,
        reason: CloseReason,
    ) -> Result<ChannelInfo, Error> {
        self.transit(
            id,
            &[
                Lifecycle::Proposed,
                Lifecycle::Accepted,
                Lifecycle::Funded,
                Lifecycle::Active,
                Lifecycle::Closing,
            ],
            |channel| {
                channel.close_reason = Some(reason);
                channel.set_lifecycle(Lifecycle::Closed)
            },
        )
    }

    fn transit(
        &self,
        id: ActiveChannelId,
        required: &'static [Lifecycle],
        f: impl FnOnce(&mut ChannelInfo),
    ) -> Result<ChannelInfo, Error> {
        let _guard = self.serialize();
        let mut channel = self.channel(id)?;
        channel.require(required)?;
        let prev = channel.lifecycle;
        f(&mut channel);
        self.store.upsert_channel(&channel)?;
        info!(
            "Channel {} lifecycle changed {} -> {}",
            id, prev, channel.lifecycle
        );
        Ok(channel)
    }
}
