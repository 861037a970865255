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


//! Persistence of the channel records

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use p2p::{ActiveChannelId, ChannelId, CommitmentId, PeerId, TempChannelId};

use crate::channel::{ChannelInfo, FundingTransaction};
use crate::commitment::{CommitmentState, CommitmentTransaction};
use crate::revocation::{
    BreachRemedyTransaction, RevocableDeliveryTransaction, RevocationSecret,
};

/// Storage backend failures
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StoreError {
    /// storage backend failure: {0}
    Backend(String),
}

/// Durable storage of the channel entities. Each operation is atomic per
/// record.
pub trait PersistenceStore: Send + Sync {
    fn upsert_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError>;

    /// Looks up channel either by its temporary or permanent id
    fn channel(
        &self,
        id: ActiveChannelId,
    ) -> Result<Option<ChannelInfo>, StoreError>;

    fn upsert_funding(
        &self,
        funding: &FundingTransaction,
    ) -> Result<(), StoreError>;

    fn funding(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<FundingTransaction>, StoreError>;

    fn upsert_commitment(
        &self,
        commitment: &CommitmentTransaction,
    ) -> Result<(), StoreError>;

    fn commitment(
        &self,
        id: CommitmentId,
    ) -> Result<Option<CommitmentTransaction>, StoreError>;

    /// All commitments of the channel, of both owners
    fn commitments(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<CommitmentTransaction>, StoreError>;

    /// The most recent commitment of the owner in a given state, ordered by
    /// the creation time and then by the commitment number
    fn latest_commitment(
        &self,
        channel_id: ChannelId,
        owner: &PeerId,
        state: CommitmentState,
    ) -> Result<Option<CommitmentTransaction>, StoreError> {
        Ok(self
            .commitments(channel_id)?
            .into_iter()
            .filter(|c| c.owner == *owner && c.state == state)
            .max_by_key(|c| (c.created_at, c.number)))
    }

    fn upsert_delivery(
        &self,
        delivery: &RevocableDeliveryTransaction,
    ) -> Result<(), StoreError>;

    fn delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError>;

    /// Removes revocable delivery transaction of a revoked commitment
    fn discard_delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError>;

    fn upsert_breach_remedy(
        &self,
        breach_remedy: &BreachRemedyTransaction,
    ) -> Result<(), StoreError>;

    fn breach_remedy(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<BreachRemedyTransaction>, StoreError>;

    fn upsert_revocation(
        &self,
        secret: &RevocationSecret,
    ) -> Result<(), StoreError>;

    fn revocation(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocationSecret>, StoreError>;
}

#[derive(Default)]
struct Tables {
    channels: HashMap<TempChannelId, ChannelInfo>,
    channel_index: HashMap<ChannelId, TempChannelId>,
    funding: HashMap<ChannelId, FundingTransaction>,
    commitments: HashMap<CommitmentId, CommitmentTransaction>,
    deliveries: HashMap<CommitmentId, RevocableDeliveryTransaction>,
    breach_remedies: HashMap<CommitmentId, BreachRemedyTransaction>,
    revocations: HashMap<CommitmentId, RevocationSecret>,
}

/// In-memory [`PersistenceStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        default!()
    }

    fn read(&self) -> RwLockReadGuard<Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistenceStore for MemoryStore {
    fn upsert_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError> {
        let mut tables = self.write();
        if let Some(channel_id) = channel.channel_id {
            tables
                .channel_index
                .insert(channel_id, channel.temporary_channel_id);
        }
        tables
            .channels
            .insert(channel.temporary_channel_id, channel.clone());
        Ok(())
    }

    fn channel(
        &self,
        id: ActiveChannelId,
    ) -> Result<Option<ChannelInfo>, StoreError> {
        let tables = self.read();
        let temp_id = match id {
            ActiveChannelId::Temporary(temp_id) => Some(temp_id),
            ActiveChannelId::Static(channel_id) => {
                tables.channel_index.get(&channel_id).copied()
            }
        };
        Ok(temp_id.and_then(|temp_id| tables.channels.get(&temp_id).cloned()))
    }

    fn upsert_funding(
        &self,
        funding: &FundingTransaction,
    ) -> Result<(), StoreError> {
        self.write()
            .funding
            .insert(funding.channel_id, funding.clone());
        Ok(())
    }

    fn funding(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<FundingTransaction>, StoreError> {
        Ok(self.read().funding.get(&channel_id).cloned())
    }

    fn upsert_commitment(
        &self,
        commitment: &CommitmentTransaction,
    ) -> Result<(), StoreError> {
        self.write()
            .commitments
            .insert(commitment.id, commitment.clone());
        Ok(())
    }

    fn commitment(
        &self,
        id: CommitmentId,
    ) -> Result<Option<CommitmentTransaction>, StoreError> {
        Ok(self.read().commitments.get(&id).cloned())
    }

    fn commitments(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<CommitmentTransaction>, StoreError> {
        let mut commitments = self
            .read()
            .commitments
            .values()
            .filter(|c| c.channel_id == channel_id)
            .cloned()
            .collect::<Vec<_>>();
        commitments.sort_by_key(|c| (c.created_at, c.number));
        Ok(commitments)
    }

    fn upsert_delivery(
        &self,
        delivery: &RevocableDeliveryTransaction,
    ) -> Result<(), StoreError> {
        self.write()
            .deliveries
            .insert(delivery.commitment_id, delivery.clone());
        Ok(())
    }

    fn delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError> {
        Ok(self.read().deliveries.get(&commitment_id).cloned())
    }

    fn discard_delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError> {
        Ok(self.write().deliveries.remove(&commitment_id))
    }

    fn upsert_breach_remedy(
        &self,
        breach_remedy: &BreachRemedyTransaction,
    ) -> Result<(), StoreError> {
        self.write()
            .breach_remedies
            .insert(breach_remedy.commitment_id, breach_remedy.clone());
        Ok(())
    }

    fn breach_remedy(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<BreachRemedyTransaction>, StoreError> {
        Ok(self.read().breach_remedies.get(&commitment_id).cloned())
    }

    fn upsert_revocation(
        &self,
        secret: &RevocationSecret,
    ) -> Result<(), StoreError> {
        self.write()
            .revocations
            .insert(secret.commitment_id, secret.clone());
        Ok(())
    }

    fn revocation(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocationSecret>, StoreError> {
        Ok(self.read().revocations.get(&commitment_id).cloned())
    }
}
