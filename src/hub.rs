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


//! Channel hub mediating protocol messages between the channel peers

use std::collections::BTreeSet;
use std::sync::Arc;

use bitcoin::Address;
use p2p::{
    AcceptChannel, ChannelId, CloseChannel, CommitmentId, CommitmentTx,
    CommitmentTxSigned, Envelope, FundingCreated, FundingSigned,
    GetBalanceRequest, MessageType, Messages, OpenChannel, PeerId,
    RevocationAck,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey};

use crate::balance::BalanceQueryService;
use crate::chain::ChainService;
use crate::channel::{
    Acceptance, ChannelInfo, ChannelRegistry, CloseReason,
    FundingCoordinator, Lifecycle,
};
use crate::commitment::{
    CommitmentEngine, CommitmentState, CommitmentTransaction, InputSource,
    Split,
};
use crate::error::{Error, StateError, ValidationError};
use crate::guard::UpdateGuard;
use crate::revocation::{BreachRemedyTransaction, RevocationManager};
use crate::session::{KeyCustody, Presence, Session};
use crate::store::PersistenceStore;
use crate::Config;

/// Phase of a commitment update
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum UpdatePhase {
    /// Payer proposed the update; it still can be aborted
    #[display("proposed")]
    Proposed,

    /// Payee signed the update; it can only be completed
    #[display("signed")]
    Signed,

    /// Update is being aborted
    #[display("aborted")]
    Aborted,
}

/// Commitment update in flight
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PendingUpdate {
    pub phase: UpdatePhase,
    pub payer: PeerId,
    pub payee: PeerId,
    pub amount: u64,

    /// Sequence number of the commitments created by the update
    pub commitment_number: u64,
    pub payer_signature: Signature,

    /// New commitments of the payer and the payee
    pub commitments: Vec<CommitmentId>,

    /// Revoked commitments which secrets are not acknowledged yet
    pub awaiting_acks: BTreeSet<CommitmentId>,
}

/// Server-side driver of the channel protocol. Processes message envelopes
/// sent by the channel peers, producing envelopes which must be delivered in
/// response.
#[derive(Getters)]
pub struct ChannelHub {
    config: Config,
    chain: Arc<dyn ChainService>,
    store: Arc<dyn PersistenceStore>,
    session: Arc<Session>,
    registry: ChannelRegistry,
    funding: FundingCoordinator,
    engine: CommitmentEngine,
    revocation: RevocationManager,
    balance: BalanceQueryService,
    updates: UpdateGuard<PendingUpdate>,
}

impl ChannelHub {
    pub fn new(
        config: Config,
        chain: Arc<dyn ChainService>,
        store: Arc<dyn PersistenceStore>,
        session: Arc<Session>,
    ) -> Self {
        ChannelHub {
            registry: ChannelRegistry::new(
                store.clone(),
                config.chain_hash(),
                config.policy.clone(),
            ),
            funding: FundingCoordinator::new(
                chain.clone(),
                config.base_property_id,
            ),
            engine: CommitmentEngine::new(
                chain.clone(),
                store.clone(),
                config.max_commitment_fee,
            ),
            revocation: RevocationManager::new(store.clone(), session.clone()),
            balance: BalanceQueryService::new(chain.clone(), store.clone()),
            updates: UpdateGuard::new(),
            config,
            chain,
            store,
            session,
        }
    }

    /// Commitment update of the channel which is in flight, if any
    pub fn pending_update(
        &self,
        channel_id: ChannelId,
    ) -> Option<PendingUpdate> {
        self.updates.with_mut(channel_id, |update| update.clone()).ok()
    }

    /// Processes envelope received from a peer
    pub fn process(&self, envelope: &Envelope) -> Result<Vec<Envelope>, Error> {
        let message = envelope.message()?;
        debug!(
            "Processing {} from {} to {}",
            message, envelope.sender, envelope.recipient
        );
        let result = match message {
            Messages::OpenChannel(msg) => self.open_channel(envelope, msg),
            Messages::AcceptChannel(msg) => self.accept_channel(envelope, msg),
            Messages::FundingCreated(msg) => {
                self.funding_created(envelope, msg)
            }
            Messages::FundingSigned(msg) => self.funding_signed(envelope, msg),
            Messages::CommitmentTx(msg) => self.commitment_tx(envelope, msg),
            Messages::CommitmentTxSigned(msg) => {
                self.commitment_tx_signed(envelope, msg)
            }
            Messages::RevocationAck(msg) => self.revocation_ack(envelope, msg),
            Messages::GetBalanceRequest(msg) => {
                self.get_balance_request(envelope, msg)
            }
            Messages::CloseChannel(msg) => self.close_channel(envelope, msg),
            message @ Messages::User(_)
            | message @ Messages::GetBalanceRespond(_) => Err(
                ValidationError::UnexpectedMessage(message.message_type())
                    .into(),
            ),
        };
        match result {
            Err(ref err) if err.is_security_violation() => {
                error!("Security violation by {}: {}", envelope.sender, err)
            }
            Err(ref err) => {
                warn!("Rejected {} from {}: {}", envelope, envelope.sender, err)
            }
            Ok(ref replies) => {
                trace!("{} produced {} replies", envelope, replies.len())
            }
        }
        result
    }

    fn forward(
        &self,
        envelope: &Envelope,
        message: impl Into<Messages>,
    ) -> Result<Envelope, Error> {
        message
            .into()
            .to_envelope(envelope.sender.clone(), envelope.recipient.clone())
            .map_err(Error::from)
    }

    fn verify(
        &self,
        message: &Message,
        signature: &Signature,
        pubkey: &PublicKey,
        signer: &PeerId,
    ) -> Result<(), Error> {
        if self.chain.verify_signature(message, signature, pubkey)? {
            Ok(())
        } else {
            Err(Error::Unauthorized(signer.clone()))
        }
    }

    fn require_recipient(
        envelope: &Envelope,
        expected: &PeerId,
    ) -> Result<(), ValidationError> {
        if envelope.recipient != *expected {
            return Err(ValidationError::WrongRecipient {
                expected: expected.clone(),
                found: envelope.recipient.clone(),
            });
        }
        Ok(())
    }

    /// P2PKH address of a funding key, validated by the chain node
    fn funding_address(&self, pubkey: &PublicKey) -> Result<Address, Error> {
        let pubkey = bitcoin::PublicKey::new(*pubkey);
        let address = Address::p2pkh(&pubkey, self.config.network).to_string();
        self.chain
            .validate_address(&address)?
            .ok_or_else(|| ValidationError::InvalidAddress(address).into())
    }

    fn open_channel(
        &self,
        envelope: &Envelope,
        open_channel: OpenChannel,
    ) -> Result<Vec<Envelope>, Error> {
        if !self.session.is_online(&envelope.recipient) {
            return Err(
                ValidationError::PeerOffline(envelope.recipient.clone()).into()
            );
        }
        let address_a = self.funding_address(&open_channel.funding_pubkey)?;
        self.registry.propose_open(
            envelope.sender.clone(),
            envelope.recipient.clone(),
            &open_channel,
            address_a,
        )?;
        Ok(vec![self.forward(envelope, open_channel)?])
    }

    fn accept_channel(
        &self,
        envelope: &Envelope,
        accept_channel: AcceptChannel,
    ) -> Result<Vec<Envelope>, Error> {
        let temp_id = accept_channel.temporary_channel_id;
        let channel = self.registry.draft(temp_id)?;
        if envelope.sender != channel.peer_b {
            return Err(Error::Unauthorized(envelope.sender.clone()));
        }
        Self::require_recipient(envelope, &channel.peer_a)?;
        let address_b = self.funding_address(&accept_channel.funding_pubkey)?;
        let multisig = self.chain.derive_multisig(&[
            channel.pubkey_a,
            accept_channel.funding_pubkey,
        ])?;
        self.registry.accept(temp_id, Acceptance {
            peer_b: envelope.sender.clone(),
            accept_channel: accept_channel.clone(),
            address_b,
            multisig,
        })?;
        Ok(vec![self.forward(envelope, accept_channel)?])
    }

    fn funding_created(
        &self,
        envelope: &Envelope,
        funding_created: FundingCreated,
    ) -> Result<Vec<Envelope>, Error> {
        let channel =
            self.registry.draft(funding_created.temporary_channel_id)?;
        let channel_id = channel.channel_id()?;
        Self::require_recipient(envelope, &channel.peer_b)?;
        if funding_created.funder_pubkey != channel.pubkey_a {
            return Err(ValidationError::KeyMismatch {
                expected: channel.pubkey_a,
                found: funding_created.funder_pubkey,
            }
            .into());
        }
        self.verify(
            &funding_created.signing_message(),
            &funding_created.funder_signature,
            &channel.pubkey_a,
            &envelope.sender,
        )?;
        if funding_created.property_id != channel.property_id {
            return Err(ValidationError::WrongAsset {
                expected: channel.property_id,
                found: funding_created.property_id,
            }
            .into());
        }

        let evidence = self
            .funding
            .decode(&funding_created.funding_tx_hex, channel.property_id)?;
        let mut funding = self.funding.validate_funding(
            &evidence,
            &channel,
            &envelope.sender,
        )?;
        if funding_created.amount_a != funding.amount_a {
            return Err(ValidationError::AmountMismatch {
                expected: funding.amount_a,
                found: funding_created.amount_a,
            }
            .into());
        }
        funding.funder_signature = Some(funding_created.funder_signature);
        self.registry.record_funding(channel_id, funding)?;
        Ok(vec![self.forward(envelope, funding_created)?])
    }

    fn funding_signed(
        &self,
        envelope: &Envelope,
        funding_signed: FundingSigned,
    ) -> Result<Vec<Envelope>, Error> {
        let channel =
            self.registry.draft(funding_signed.temporary_channel_id)?;
        let channel_id = channel.channel_id()?;
        if envelope.sender != channel.peer_b {
            return Err(Error::Unauthorized(envelope.sender.clone()));
        }
        Self::require_recipient(envelope, &channel.peer_a)?;
        channel.require(&[Lifecycle::Funded])?;
        let funding = self
            .store
            .funding(channel_id)?
            .ok_or(StateError::NoFunding(channel_id))?;
        self.funding
            .verify_funding_signed(&channel, &funding_signed, &funding)?;
        let funder_signature = funding
            .funder_signature
            .ok_or(ValidationError::MissingSignature)?;

        let channel = self.registry.activate(channel_id)?;
        let owners = [
            (
                &channel.peer_a,
                funding_signed.fundee_signature,
                funding.amount_a,
                funding.amount_b,
            ),
            (
                &channel.peer_b,
                funder_signature,
                funding.amount_b,
                funding.amount_a,
            ),
        ];
        for (owner, counterparty_signature, to_rsmc, to_other) in owners {
            let commitment = self.new_commitment(
                owner,
                &channel,
                InputSource::Funding(funding.clone()),
                to_rsmc,
                to_other,
            )?;
            let commitment =
                self.engine.mark_signed(commitment.id, counterparty_signature)?;
            self.revocation.build_delivery(&commitment, &channel)?;
        }

        let reply = FundingSigned {
            redeem_script: Some(channel.redeem_script()?.clone()),
            p2sh_address: Some(channel.channel_address()?.clone()),
            channel_id: Some(channel_id),
            ..funding_signed
        };
        Ok(vec![self.forward(envelope, reply)?])
    }

    /// Builds commitment with a fresh temporary RSMC key; the key is
    /// forgotten if the commitment can't be constructed
    fn new_commitment(
        &self,
        owner: &PeerId,
        channel: &ChannelInfo,
        source: InputSource,
        to_rsmc: u64,
        to_other: u64,
    ) -> Result<CommitmentTransaction, Error> {
        let rsmc_pubkey = self.session.generate();
        let split = Split {
            to_rsmc,
            to_other,
            to_htlc: 0,
            rsmc_pubkey,
            htlc_pubkey: None,
        };
        self.engine
            .build_commitment(owner, channel, source, split)
            .map_err(|err| {
                self.session.discard(&rsmc_pubkey);
                err
            })
    }

    fn cancel_commitments(&self, ids: &[CommitmentId]) -> Result<(), Error> {
        for id in ids {
            let commitment = self.engine.cancel(*id)?;
            for pubkey in commitment.temp_pubkeys() {
                self.session.discard(&pubkey);
            }
        }
        Ok(())
    }

    fn commitment_tx(
        &self,
        envelope: &Envelope,
        commitment_tx: CommitmentTx,
    ) -> Result<Vec<Envelope>, Error> {
        if commitment_tx.is_disclosure() {
            return Err(ValidationError::UnexpectedMessage(
                MessageType::CommitmentTx,
            )
            .into());
        }
        let channel_id = commitment_tx.channel_id;
        let channel = self.registry.active(channel_id)?;
        let payer = envelope.sender.clone();
        let payee = channel.counterparty(&payer)?.clone();
        Self::require_recipient(envelope, &payee)?;
        if commitment_tx.property_id != channel.property_id {
            return Err(ValidationError::WrongAsset {
                expected: channel.property_id,
                found: commitment_tx.property_id,
            }
            .into());
        }
        if commitment_tx.amount == 0 {
            return Err(ValidationError::ZeroPayment.into());
        }
        let payer_signature = commitment_tx
            .signature
            .ok_or(ValidationError::MissingSignature)?;
        self.verify(
            &commitment_tx.signing_message(),
            &payer_signature,
            &channel.pubkey_of(&payer)?,
            &payer,
        )?;

        self.updates.begin(channel_id, PendingUpdate {
            phase: UpdatePhase::Proposed,
            payer: payer.clone(),
            payee: payee.clone(),
            amount: commitment_tx.amount,
            commitment_number: commitment_tx.commitment_number,
            payer_signature,
            commitments: vec![],
            awaiting_acks: empty!(),
        })?;
        // Close requests are serialized with the update slot, so the
        // lifecycle read under the slot can't change until it is released
        let proposed =
            self.registry.active(channel_id).and_then(|channel| {
                self.propose_update(&channel, &payer, &payee, &commitment_tx)
            });
        let commitments = match proposed {
            Ok(commitments) => commitments,
            Err(err) => {
                self.updates.finish(channel_id);
                return Err(err);
            }
        };
        self.updates.with_mut(channel_id, |update| {
            update.commitments = commitments;
        })?;
        info!(
            "Update of channel {} proposed: {} pays {} to {}",
            channel_id, payer, commitment_tx.amount, payee
        );
        Ok(vec![self.forward(envelope, commitment_tx)?])
    }

    fn propose_update(
        &self,
        channel: &ChannelInfo,
        payer: &PeerId,
        payee: &PeerId,
        commitment_tx: &CommitmentTx,
    ) -> Result<Vec<CommitmentId>, Error> {
        let channel_id = channel.channel_id()?;
        let amount = commitment_tx.amount;
        let prev_payer = self.engine.latest_signed(channel_id, payer)?;
        let prev_payee = self.engine.latest_signed(channel_id, payee)?;
        let expected = prev_payer.number + 1;
        if commitment_tx.commitment_number != expected {
            return Err(StateError::StaleUpdate {
                channel: channel_id,
                expected,
                found: commitment_tx.commitment_number,
            }
            .into());
        }
        let available =
            prev_payer.amount_to_rsmc.min(prev_payee.amount_to_other);
        if amount > available {
            return Err(ValidationError::InsufficientFunds {
                available,
                requested: amount,
            }
            .into());
        }

        let payer_commitment = self.new_commitment(
            payer,
            channel,
            InputSource::Previous(prev_payer.id),
            prev_payer.amount_to_rsmc - amount,
            prev_payer.amount_to_other + amount,
        )?;
        let payee_commitment = match self.new_commitment(
            payee,
            channel,
            InputSource::Previous(prev_payee.id),
            prev_payee.amount_to_rsmc + amount,
            prev_payee.amount_to_other - amount,
        ) {
            Ok(commitment) => commitment,
            Err(err) => {
                self.cancel_commitments(&[payer_commitment.id])?;
                return Err(err);
            }
        };
        Ok(vec![payer_commitment.id, payee_commitment.id])
    }

    fn commitment_tx_signed(
        &self,
        envelope: &Envelope,
        signed: CommitmentTxSigned,
    ) -> Result<Vec<Envelope>, Error> {
        let channel_id = signed.channel_id;
        let channel = self.registry.active(channel_id)?;
        let update = self
            .updates
            .with_mut(channel_id, |update| update.clone())?;
        if envelope.sender != update.payee {
            return Err(Error::Unauthorized(envelope.sender.clone()));
        }
        Self::require_recipient(envelope, &update.payer)?;
        if signed.property_id != channel.property_id {
            return Err(ValidationError::WrongAsset {
                expected: channel.property_id,
                found: signed.property_id,
            }
            .into());
        }
        if signed.amount != update.amount {
            return Err(ValidationError::AmountMismatch {
                expected: update.amount,
                found: signed.amount,
            }
            .into());
        }
        if signed.commitment_number != update.commitment_number {
            return Err(StateError::StaleUpdate {
                channel: channel_id,
                expected: update.commitment_number,
                found: signed.commitment_number,
            }
            .into());
        }
        self.verify(
            &signed.signing_message(),
            &signed.receiver_signature,
            &channel.pubkey_of(&update.payee)?,
            &update.payee,
        )?;

        let update = self.updates.with_mut(channel_id, |update| {
            match update.phase {
                UpdatePhase::Proposed if update.commitments.len() == 2 => {
                    update.phase = UpdatePhase::Signed;
                    Ok(update.clone())
                }
                UpdatePhase::Signed => Ok(update.clone()),
                UpdatePhase::Proposed => Err(StateError::Busy(channel_id)),
                UpdatePhase::Aborted => Err(StateError::NoUpdate(channel_id)),
            }
        })??;

        let mut replies = self.complete_update(
            &channel,
            &update,
            signed.receiver_signature,
        )?;
        replies.push(self.forward(envelope, signed)?);
        Ok(replies)
    }

    /// Signs the new commitments and revokes the superseded ones. Safe to
    /// repeat: already signed commitments are kept and already disclosed
    /// secrets are resent instead of being disclosed again.
    fn complete_update(
        &self,
        channel: &ChannelInfo,
        update: &PendingUpdate,
        receiver_signature: Signature,
    ) -> Result<Vec<Envelope>, Error> {
        let channel_id = channel.channel_id()?;
        let signatures = [receiver_signature, update.payer_signature];
        let mut replies = vec![];
        for (id, signature) in update.commitments.iter().zip(signatures) {
            let commitment = self
                .store
                .commitment(*id)?
                .ok_or(StateError::UnknownCommitment(*id))?;
            let commitment = match commitment.state {
                CommitmentState::Created => {
                    self.engine.mark_signed(*id, signature)?
                }
                _ => commitment,
            };
            if self.store.delivery(*id)?.is_none() {
                self.revocation.build_delivery(&commitment, channel)?;
            }

            let secret = match self.revocation.retire_previous(
                channel,
                &commitment.owner,
                *id,
            ) {
                Ok(secret) => secret,
                Err(Error::State(StateError::AlreadyRevoked(prior))) => {
                    self.revocation.disclosure(prior)?
                }
                Err(err) => return Err(err),
            };
            if !secret.is_acknowledged() {
                self.updates.with_mut(channel_id, |update| {
                    update.awaiting_acks.insert(secret.commitment_id)
                })?;
            }
            let disclosure = CommitmentTx {
                channel_id,
                property_id: channel.property_id,
                amount: update.amount,
                commitment_number: update.commitment_number,
                signature: None,
                encrypted_revocation_secret: Some(secret.encrypted),
            };
            replies.push(
                Messages::from(disclosure)
                    .to_envelope(secret.owner, secret.recipient)?,
            );
        }
        Ok(replies)
    }

    fn revocation_ack(
        &self,
        envelope: &Envelope,
        ack: RevocationAck,
    ) -> Result<Vec<Envelope>, Error> {
        let disclosure = self.revocation.disclosure(ack.commitment_id)?;
        if disclosure.channel_id != ack.channel_id {
            return Err(ValidationError::ChannelIdMismatch {
                expected: disclosure.channel_id,
                found: ack.channel_id,
            }
            .into());
        }
        self.revocation
            .acknowledge(ack.commitment_id, &envelope.sender)?;

        let completed = self.updates.with_mut(ack.channel_id, |update| {
            update.awaiting_acks.remove(&ack.commitment_id);
            update.phase == UpdatePhase::Signed
                && update.awaiting_acks.is_empty()
        });
        if let Ok(true) = completed {
            self.updates.finish(ack.channel_id);
            info!("Update of channel {} is completed", ack.channel_id);
        }
        Ok(vec![])
    }

    fn get_balance_request(
        &self,
        envelope: &Envelope,
        request: GetBalanceRequest,
    ) -> Result<Vec<Envelope>, Error> {
        if envelope.sender != request.who {
            return Err(Error::Unauthorized(envelope.sender.clone()));
        }
        let balance = self.balance.query_balance(&request)?;
        let respond = balance.into_respond(request.channel_id);
        Ok(vec![Messages::from(respond).to_envelope(
            self.config.node_id.clone(),
            envelope.sender.clone(),
        )?])
    }

    fn close_channel(
        &self,
        envelope: &Envelope,
        close_channel: CloseChannel,
    ) -> Result<Vec<Envelope>, Error> {
        let channel_id = close_channel.channel_id;
        let channel = self.registry.channel(channel_id)?;
        let sender = &envelope.sender;
        self.verify(
            &close_channel.signing_message(),
            &close_channel.signature,
            &channel.pubkey_of(sender)?,
            sender,
        )?;
        Self::require_recipient(envelope, channel.counterparty(sender)?)?;
        self.updates.exclusive(channel_id, || -> Result<(), Error> {
            let channel = self.registry.channel(channel_id)?;
            match channel.lifecycle {
                Lifecycle::Closing => {
                    if channel.close_initiator.as_ref() == Some(sender) {
                        return Err(
                            StateError::CloseRequested(channel_id).into()
                        );
                    }
                    self.registry
                        .close(channel_id.into(), CloseReason::Cooperative)?;
                    self.engine.close_all(channel_id)?;
                }
                _ => {
                    self.registry.begin_closing(channel_id, sender)?;
                }
            }
            Ok(())
        })??;
        Ok(vec![self.forward(envelope, close_channel)?])
    }

    /// Aborts commitment update which was not signed by the payee yet,
    /// cancelling its commitments
    pub fn abort_update(&self, channel_id: ChannelId) -> Result<(), Error> {
        let update = self.updates.with_mut(channel_id, |update| {
            match update.phase {
                UpdatePhase::Proposed => {
                    update.phase = UpdatePhase::Aborted;
                    Ok(update.clone())
                }
                _ => Err(StateError::UpdateSigned(channel_id)),
            }
        })??;
        let result = self.cancel_commitments(&update.commitments);
        self.updates.finish(channel_id);
        info!("Update of channel {} is aborted", channel_id);
        result
    }

    /// Claims funds of a published revoked commitment for the counterparty
    /// of its owner, closing the channel
    pub fn penalize(
        &self,
        channel_id: ChannelId,
        commitment_id: CommitmentId,
        claimant: &PeerId,
        disclosed_secret: &SecretKey,
    ) -> Result<BreachRemedyTransaction, Error> {
        let channel = self.registry.channel(channel_id)?;
        let commitment = self
            .store
            .commitment(commitment_id)?
            .ok_or(StateError::UnknownCommitment(commitment_id))?;
        if commitment.channel_id != channel_id {
            return Err(ValidationError::ChannelIdMismatch {
                expected: channel_id,
                found: commitment.channel_id,
            }
            .into());
        }
        if channel.counterparty(&commitment.owner)? != claimant {
            return Err(Error::Unauthorized(claimant.clone()));
        }
        channel.require(&[Lifecycle::Active, Lifecycle::Closing])?;
        let breach_remedy = self.revocation.build_breach_remedy(
            &commitment,
            &channel,
            disclosed_secret,
        )?;
        self.registry.close(
            channel_id.into(),
            CloseReason::Breach {
                commitment: commitment_id,
            },
        )?;
        self.engine.close_all(channel_id)?;
        self.updates.finish(channel_id);
        warn!(
            "Channel {} is closed after breach by {}",
            channel_id, commitment.owner
        );
        Ok(breach_remedy)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use p2p::{EncryptedSecret, USDT_PROPERTY_ID};

    use super::*;
    use crate::test_utils::{
        alice, bob, carol, open_channel, pubkey, secret, seed_of, HubFixture,
    };

    fn balance(
        fixture: &HubFixture,
        channel_id: ChannelId,
        who: &PeerId,
    ) -> u64 {
        let node_id = fixture.hub.config().node_id.clone();
        let request = fixture.balance_request(channel_id, who);
        let replies = fixture.send(who, &node_id, request).unwrap();
        assert_eq!(replies[0].recipient, *who);
        match replies[0].message().unwrap() {
            Messages::GetBalanceRespond(respond) => {
                assert_eq!(respond.name, "TetherUS");
                respond.balance
            }
            other => panic!("unexpected reply {}", other),
        }
    }

    fn commitments(
        fixture: &HubFixture,
        channel_id: ChannelId,
        state: CommitmentState,
    ) -> Vec<CommitmentTransaction> {
        fixture
            .store
            .commitments(channel_id)
            .unwrap()
            .into_iter()
            .filter(|commitment| commitment.state == state)
            .collect()
    }

    fn disclosed_id(envelope: &Envelope) -> CommitmentId {
        match envelope.message().unwrap() {
            Messages::CommitmentTx(CommitmentTx {
                encrypted_revocation_secret: Some(encrypted),
                ..
            }) => encrypted.commitment_id,
            other => panic!("not a disclosure: {}", other),
        }
    }

    /// Secret of the `owner` commitment revoked by the disclosures, decrypted
    /// by its recipient
    fn revealed(
        fixture: &HubFixture,
        disclosures: &[Envelope],
        owner: &PeerId,
    ) -> (CommitmentId, SecretKey) {
        let envelope = disclosures
            .iter()
            .find(|envelope| envelope.sender == *owner)
            .unwrap();
        let encrypted = match envelope.message().unwrap() {
            Messages::CommitmentTx(CommitmentTx {
                encrypted_revocation_secret: Some(encrypted),
                ..
            }) => encrypted,
            other => panic!("not a disclosure: {}", other),
        };
        let secret = fixture
            .hub
            .revocation()
            .decrypt_secret(&encrypted, &secret(seed_of(&envelope.recipient)))
            .unwrap();
        (encrypted.commitment_id, secret)
    }

    #[test]
    fn open_and_fund() {
        let fixture = HubFixture::new();
        let reply = fixture.fund(100000, 0);
        let channel_id = reply.channel_id.unwrap();
        let redeem_script = reply.redeem_script.unwrap();
        let network = fixture.hub.config().network;
        assert_eq!(
            reply.p2sh_address,
            Some(Address::p2shwsh(&redeem_script, network))
        );
        assert_eq!(
            channel_id,
            ChannelId::with(&reply.p2sh_address.unwrap())
        );

        let channel = fixture.hub.registry().channel(channel_id).unwrap();
        assert_eq!(channel.lifecycle, Lifecycle::Active);
        assert_eq!(channel.property_id, USDT_PROPERTY_ID);
        let signed = commitments(&fixture, channel_id, CommitmentState::Signed);
        assert_eq!(signed.len(), 2);
        for commitment in signed {
            assert!(fixture.store.delivery(commitment.id).unwrap().is_some());
        }
        assert_eq!(balance(&fixture, channel_id, &alice()), 100000);
        assert_eq!(balance(&fixture, channel_id, &bob()), 0);
    }

    #[test]
    fn pushed_funds() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 25000).channel_id.unwrap();
        assert_eq!(balance(&fixture, channel_id, &alice()), 75000);
        assert_eq!(balance(&fixture, channel_id, &bob()), 25000);
    }

    #[test]
    fn fundee_offline() {
        let fixture = HubFixture::new();
        fixture.session.set_online(bob(), false);
        assert_eq!(
            fixture.send(&alice(), &bob(), open_channel(100000, 0)),
            Err(ValidationError::PeerOffline(bob()).into())
        );
    }

    #[test]
    fn funding_amount_mismatch() {
        let fixture = HubFixture::new();
        let temp_id = fixture.open(100000, 0);
        let channel = fixture.hub.registry().draft(temp_id).unwrap();
        let funding_created = fixture.funding_created(temp_id);
        fixture.chain.add_asset_funding(
            &funding_created.funding_tx_hex,
            &channel.address_a,
            channel.channel_address().unwrap(),
            99000,
        );
        assert_eq!(
            fixture.send(&alice(), &bob(), funding_created),
            Err(ValidationError::AmountMismatch {
                expected: 100000,
                found: 99000
            }
            .into())
        );
        let channel = fixture.hub.registry().draft(temp_id).unwrap();
        assert_eq!(channel.lifecycle, Lifecycle::Accepted);
    }

    #[test]
    fn fundee_signature() {
        let fixture = HubFixture::new();
        let temp_id = fixture.open(100000, 0);
        fixture
            .send(&alice(), &bob(), fixture.funding_created(temp_id))
            .unwrap();
        let mut funding_signed = fixture.funding_signed(temp_id);
        funding_signed.fundee_signature =
            fixture.funding_created(temp_id).funder_signature;
        assert_eq!(
            fixture.send(&bob(), &alice(), funding_signed),
            Err(Error::Unauthorized(bob()))
        );
        let channel = fixture.hub.registry().draft(temp_id).unwrap();
        assert_eq!(channel.lifecycle, Lifecycle::Funded);
    }

    #[test]
    fn payment() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let initial =
            commitments(&fixture, channel_id, CommitmentState::Signed);

        let disclosures =
            fixture.sign_payment(channel_id, &alice(), &bob(), 40000);
        assert_eq!(disclosures.len(), 2);
        assert!(fixture.hub.updates().is_busy(channel_id));
        fixture.acknowledge(channel_id, &disclosures);
        assert_eq!(fixture.hub.pending_update(channel_id), None);

        for commitment in initial {
            let commitment =
                fixture.store.commitment(commitment.id).unwrap().unwrap();
            assert_eq!(commitment.state, CommitmentState::Revoked);
            assert!(fixture.store.delivery(commitment.id).unwrap().is_none());
        }
        assert_eq!(balance(&fixture, channel_id, &alice()), 60000);
        assert_eq!(balance(&fixture, channel_id, &bob()), 40000);

        fixture.pay(channel_id, &bob(), &alice(), 5000);
        assert_eq!(balance(&fixture, channel_id, &alice()), 65000);
        assert_eq!(balance(&fixture, channel_id, &bob()), 35000);
        assert_eq!(
            commitments(&fixture, channel_id, CommitmentState::Revoked).len(),
            4
        );
    }

    #[test]
    fn insufficient_funds() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let commitment_tx = fixture.commitment_tx(channel_id, &bob(), 1);
        assert_eq!(
            fixture.send(&bob(), &alice(), commitment_tx),
            Err(ValidationError::InsufficientFunds {
                available: 0,
                requested: 1
            }
            .into())
        );
        assert!(!fixture.hub.updates().is_busy(channel_id));
    }

    #[test]
    fn payer_signature_required() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let mut commitment_tx = fixture.commitment_tx(channel_id, &alice(), 10);
        commitment_tx.amount = 20;
        assert_eq!(
            fixture.send(&alice(), &bob(), commitment_tx),
            Err(Error::Unauthorized(alice()))
        );
    }

    #[test]
    fn busy_channel() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let commitment_tx = fixture.commitment_tx(channel_id, &alice(), 100);
        fixture
            .send(&alice(), &bob(), commitment_tx.clone())
            .unwrap();
        assert_eq!(
            fixture.send(&alice(), &bob(), commitment_tx),
            Err(StateError::Busy(channel_id).into())
        );
        let close_channel = fixture.close_channel(channel_id, &alice());
        assert_eq!(
            fixture.send(&alice(), &bob(), close_channel),
            Err(StateError::Busy(channel_id).into())
        );

        fixture.hub.abort_update(channel_id).unwrap();
        assert_eq!(
            commitments(&fixture, channel_id, CommitmentState::Cancelled).len(),
            2
        );
        fixture.pay(channel_id, &alice(), &bob(), 100);
        assert_eq!(balance(&fixture, channel_id, &bob()), 100);
    }

    #[test]
    fn signed_update_cant_be_aborted() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let disclosures = fixture.sign_payment(channel_id, &alice(), &bob(), 7);
        assert_eq!(
            fixture.hub.abort_update(channel_id),
            Err(StateError::UpdateSigned(channel_id).into())
        );
        fixture.acknowledge(channel_id, &disclosures);
        assert_eq!(
            fixture.hub.abort_update(channel_id),
            Err(StateError::NoUpdate(channel_id).into())
        );
    }

    #[test]
    fn repeated_signature_resends_disclosures() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let disclosures = fixture.sign_payment(channel_id, &alice(), &bob(), 7);
        let signed = fixture.commitment_tx_signed(channel_id, &bob(), 7);
        let replies = fixture.send(&bob(), &alice(), signed).unwrap();
        assert_eq!(replies[..2], disclosures[..]);

        let disclosure = &disclosures[0];
        let ack = RevocationAck {
            channel_id,
            commitment_id: disclosed_id(disclosure),
        };
        assert_eq!(
            fixture.send(
                &disclosure.sender,
                &disclosure.recipient,
                ack.clone()
            ),
            Err(Error::Unauthorized(disclosure.sender.clone()))
        );
        fixture.acknowledge(channel_id, &disclosures);
        assert_eq!(
            fixture.send(&disclosure.recipient, &disclosure.sender, ack),
            Err(StateError::AlreadyAcknowledged(disclosed_id(disclosure))
                .into())
        );
    }

    #[test]
    fn breach_remedy() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let revoked = commitments(&fixture, channel_id, CommitmentState::Signed)
            .into_iter()
            .find(|commitment| commitment.owner == alice())
            .unwrap();
        let disclosures = fixture.pay(channel_id, &alice(), &bob(), 30000);
        let (revoked_id, disclosed) =
            revealed(&fixture, &disclosures, &alice());
        assert_eq!(revoked_id, revoked.id);
        let (_, bob_secret) = revealed(&fixture, &disclosures, &bob());

        assert_eq!(
            fixture.hub.penalize(channel_id, revoked.id, &alice(), &disclosed),
            Err(Error::Unauthorized(alice()))
        );
        assert_eq!(
            fixture.hub.penalize(channel_id, revoked.id, &bob(), &bob_secret),
            Err(Error::SecretMismatch {
                commitment: revoked.id
            })
        );
        assert_eq!(fixture.store.breach_remedy(revoked.id), Ok(None));
        let breach_remedy = fixture
            .hub
            .penalize(channel_id, revoked.id, &bob(), &disclosed)
            .unwrap();
        assert_eq!(breach_remedy.amount, 100000);
        assert_eq!(breach_remedy.beneficiary, bob());

        let channel = fixture.hub.registry().channel(channel_id).unwrap();
        assert_eq!(channel.lifecycle, Lifecycle::Closed);
        assert_eq!(
            channel.close_reason,
            Some(CloseReason::Breach {
                commitment: revoked.id
            })
        );
        assert!(commitments(&fixture, channel_id, CommitmentState::Signed)
            .is_empty());
    }

    #[test]
    fn outsider_balance() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let node_id = fixture.hub.config().node_id.clone();
        let request = fixture.balance_request(channel_id, &carol());
        assert_eq!(
            fixture.send(&carol(), &node_id, request),
            Err(Error::Unauthorized(carol()))
        );
        let request = fixture.balance_request(channel_id, &alice());
        assert_eq!(
            fixture.send(&carol(), &node_id, request),
            Err(Error::Unauthorized(carol()))
        );
    }

    #[test]
    fn cooperative_close() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let close_channel = fixture.close_channel(channel_id, &alice());
        fixture
            .send(&alice(), &bob(), close_channel.clone())
            .unwrap();
        assert_eq!(
            fixture.send(&alice(), &bob(), close_channel),
            Err(StateError::CloseRequested(channel_id).into())
        );
        let commitment_tx = fixture.commitment_tx(channel_id, &alice(), 1);
        assert!(matches!(
            fixture.send(&alice(), &bob(), commitment_tx),
            Err(Error::State(StateError::LifecycleMismatch { .. }))
        ));
        assert!(!fixture.hub.updates().is_busy(channel_id));

        let close_channel = fixture.close_channel(channel_id, &bob());
        let replies = fixture.send(&bob(), &alice(), close_channel).unwrap();
        assert_eq!(replies[0].recipient, alice());
        let channel = fixture.hub.registry().channel(channel_id).unwrap();
        assert_eq!(channel.lifecycle, Lifecycle::Closed);
        assert_eq!(channel.close_reason, Some(CloseReason::Cooperative));
        assert_eq!(
            commitments(&fixture, channel_id, CommitmentState::Closed).len(),
            2
        );
    }

    #[test]
    fn disclosures_come_from_hub_only() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let mut commitment_tx = fixture.commitment_tx(channel_id, &alice(), 1);
        commitment_tx.encrypted_revocation_secret = Some(EncryptedSecret {
            commitment_id: CommitmentId::with(
                channel_id,
                &alice(),
                0,
                &pubkey(5),
            ),
            ephemeral_pubkey: pubkey(6),
            nonce: vec![0; 12],
            ciphertext: vec![0; 48],
        });
        assert_eq!(
            fixture.send(&alice(), &bob(), commitment_tx),
            Err(ValidationError::UnexpectedMessage(MessageType::CommitmentTx)
                .into())
        );
    }

    #[test]
    fn concurrent_updates() {
        let fixture = Arc::new(HubFixture::new());
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles = (0..2)
            .map(|_| {
                let fixture = fixture.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let commitment_tx =
                        fixture.commitment_tx(channel_id, &alice(), 10);
                    barrier.wait();
                    fixture.send(&alice(), &bob(), commitment_tx)
                })
            })
            .collect::<Vec<_>>();
        let mut results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        results.sort_by_key(Result::is_err);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(StateError::Busy(channel_id).into()));
    }

    #[test]
    fn replayed_proposal() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let proposal = fixture.commitment_tx(channel_id, &alice(), 1000);
        assert_eq!(proposal.commitment_number, 1);
        fixture.send(&alice(), &bob(), proposal.clone()).unwrap();
        let signed = fixture.commitment_tx_signed(channel_id, &bob(), 1000);
        let replies = fixture.send(&bob(), &alice(), signed.clone()).unwrap();
        fixture.acknowledge(channel_id, &replies[..2]);
        assert_eq!(fixture.hub.pending_update(channel_id), None);

        let stale = StateError::StaleUpdate {
            channel: channel_id,
            expected: 2,
            found: 1,
        };
        assert_eq!(
            fixture.send(&alice(), &bob(), proposal),
            Err(stale.clone().into())
        );
        assert!(!fixture.hub.updates().is_busy(channel_id));

        let next = fixture.commitment_tx(channel_id, &alice(), 1000);
        fixture.send(&alice(), &bob(), next).unwrap();
        assert_eq!(fixture.send(&bob(), &alice(), signed), Err(stale.into()));
        assert_eq!(
            fixture.hub.pending_update(channel_id).map(|u| u.phase),
            Some(UpdatePhase::Proposed)
        );
        fixture.hub.abort_update(channel_id).unwrap();

        assert_eq!(balance(&fixture, channel_id, &alice()), 99000);
        assert_eq!(balance(&fixture, channel_id, &bob()), 1000);
    }

    #[test]
    fn close_races_with_update() {
        for _ in 0..16 {
            let fixture = Arc::new(HubFixture::new());
            let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
            let proposal = fixture.commitment_tx(channel_id, &alice(), 10);
            let close_channel = fixture.close_channel(channel_id, &bob());
            let barrier = Arc::new(Barrier::new(2));

            let proposer = {
                let fixture = fixture.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    fixture.send(&alice(), &bob(), proposal)
                })
            };
            let closer = {
                let fixture = fixture.clone();
                thread::spawn(move || {
                    barrier.wait();
                    fixture.send(&bob(), &alice(), close_channel)
                })
            };
            let proposed = proposer.join().unwrap();
            let closed = closer.join().unwrap();

            let channel = fixture.hub.registry().channel(channel_id).unwrap();
            let busy = fixture.hub.updates().is_busy(channel_id);
            match (proposed, closed) {
                (Ok(_), Err(err)) => {
                    assert_eq!(err, StateError::Busy(channel_id).into());
                    assert_eq!(channel.lifecycle, Lifecycle::Active);
                    assert!(busy);
                }
                (
                    Err(Error::State(StateError::LifecycleMismatch { .. })),
                    Ok(_),
                ) => {
                    assert_eq!(channel.lifecycle, Lifecycle::Closing);
                    assert!(!busy);
                    assert!(commitments(
                        &fixture,
                        channel_id,
                        CommitmentState::Created
                    )
                    .is_empty());
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn penalty_after_close() {
        let fixture = HubFixture::new();
        let channel_id = fixture.fund(100000, 0).channel_id.unwrap();
        let disclosures = fixture.pay(channel_id, &alice(), &bob(), 30000);
        let (revoked_id, disclosed) =
            revealed(&fixture, &disclosures, &alice());

        let close_channel = fixture.close_channel(channel_id, &alice());
        fixture.send(&alice(), &bob(), close_channel).unwrap();
        let close_channel = fixture.close_channel(channel_id, &bob());
        fixture.send(&bob(), &alice(), close_channel).unwrap();

        assert!(matches!(
            fixture.hub.penalize(channel_id, revoked_id, &bob(), &disclosed),
            Err(Error::State(StateError::LifecycleMismatch { .. }))
        ));
        assert_eq!(fixture.store.breach_remedy(revoked_id), Ok(None));
        let channel = fixture.hub.registry().channel(channel_id).unwrap();
        assert_eq!(channel.close_reason, Some(CloseReason::Cooperative));
    }
}
