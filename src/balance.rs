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

use p2p::{
    ActiveChannelId, ChannelId, GetBalanceRequest, GetBalanceRespond,
};

use crate::chain::ChainService;
use crate::commitment::CommitmentState;
use crate::error::{Error, StateError, ValidationError};
use crate::store::PersistenceStore;

/// Balance of the requester side of a channel
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display("{amount} of {name} (#{property_id}), {reserved} in HTLCs")]
pub struct Balance {
    pub property_id: u32,

    /// Asset name
    pub name: String,

    /// Funds in RSMC output of the latest signed commitment
    pub amount: u64,

    /// Funds locked in HTLC output
    pub reserved: u64,

    pub frozen: u64,
}

impl Balance {
    pub fn into_respond(self, channel_id: ChannelId) -> GetBalanceRespond {
        GetBalanceRespond {
            channel_id,
            property_id: self.property_id,
            name: self.name,
            balance: self.amount,
            reserved: self.reserved,
            frozen: self.frozen,
        }
    }
}

/// Answers signed balance requests of the channel peers
pub struct BalanceQueryService {
    chain: Arc<dyn ChainService>,
    store: Arc<dyn PersistenceStore>,
}

impl BalanceQueryService {
    pub fn new(
        chain: Arc<dyn ChainService>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        BalanceQueryService { chain, store }
    }

    /// Reports balance of the requester from its latest signed commitment.
    /// Only the channel peers are allowed to query the balance.
    pub fn query_balance(
        &self,
        request: &GetBalanceRequest,
    ) -> Result<Balance, Error> {
        let id = ActiveChannelId::from(request.channel_id);
        let channel = self
            .store
            .channel(id)?
            .ok_or(StateError::UnknownChannel(id))?;
        if !channel.is_participant(&request.who) {
            warn!(
                "Balance of channel {} is requested by outsider {}",
                request.channel_id, request.who
            );
            return Err(Error::Unauthorized(request.who.clone()));
        }
        let channel_address = channel.channel_address()?;
        if request.p2sh_address != *channel_address {
            return Err(ValidationError::ChannelAddressMismatch {
                expected: channel_address.clone(),
                found: request.p2sh_address.clone(),
            }
            .into());
        }
        if request.property_id != channel.property_id {
            return Err(ValidationError::WrongAsset {
                expected: channel.property_id,
                found: request.property_id,
            }
            .into());
        }
        let pubkey = channel.pubkey_of(&request.who)?;
        if !self.chain.verify_signature(
            &request.signing_message(),
            &request.signature,
            &pubkey,
        )? {
            warn!(
                "Invalid signature of balance request of {} for channel {}",
                request.who, request.channel_id
            );
            return Err(Error::Unauthorized(request.who.clone()));
        }

        let commitment = self
            .store
            .latest_commitment(
                request.channel_id,
                &request.who,
                CommitmentState::Signed,
            )?
            .ok_or_else(|| StateError::NoSignedCommitment {
                channel: request.channel_id,
                owner: request.who.clone(),
            })?;
        let property = self.chain.property(channel.property_id)?;
        Ok(Balance {
            property_id: channel.property_id,
            name: property.name,
            amount: commitment.amount_to_rsmc,
            reserved: commitment.amount_to_htlc,
            frozen: 0,
        })
    }
}
