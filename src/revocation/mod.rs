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


//! Revocation of superseded commitments and the penalty transactions

mod crypto;

pub use crypto::{decrypt_secret, encrypt_secret, CryptoError};

use std::sync::Arc;

use bitcoin::blockdata::transaction::{TxIn, TxOut};
use bitcoin::{Address, PackedLockTime, Script, Sequence, Transaction};
use chrono::{DateTime, Utc};
use p2p::{ChannelId, CommitmentId, EncryptedSecret, PeerId, BTC_PROPERTY_ID};
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelInfo;
use crate::commitment::{
    nested_script_sig, omni_simple_send, CommitmentState,
    CommitmentTransaction, InputRef,
};
use crate::error::{Error, StateError};
use crate::session::KeyCustody;
use crate::store::PersistenceStore;

/// Spends RSMC output of the owner commitment to the owner after the relative
/// lock expires. Exists only while the commitment is the latest signed one.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RevocableDeliveryTransaction {
    pub commitment_id: CommitmentId,
    pub channel_id: ChannelId,
    pub owner: PeerId,
    pub property_id: u32,

    /// RSMC output of the commitment
    pub input: InputRef,

    /// Script sig of the P2SH-wrapped RSMC input
    pub script_sig: Script,

    pub output_address: Address,

    /// Relative lock in blocks
    pub sequence: u16,

    pub amount: u64,

    pub created_at: DateTime<Utc>,
}

/// Spends RSMC output of a revoked commitment to the counterparty of the
/// cheating owner
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BreachRemedyTransaction {
    pub commitment_id: CommitmentId,
    pub channel_id: ChannelId,

    /// Owner of the revoked commitment
    pub cheater: PeerId,

    pub beneficiary: PeerId,
    pub property_id: u32,
    pub input: InputRef,
    pub script_sig: Script,
    pub output_address: Address,
    pub amount: u64,
    pub created_at: DateTime<Utc>,
}

/// Disclosed RSMC temporary secret of a revoked commitment
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RevocationSecret {
    pub commitment_id: CommitmentId,
    pub channel_id: ChannelId,

    /// Owner of the revoked commitment
    pub owner: PeerId,

    pub recipient: PeerId,
    pub encrypted: EncryptedSecret,
    pub disclosed_at: DateTime<Utc>,

    /// Set once the recipient confirms the disclosure
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl RevocationSecret {
    #[inline]
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

fn spending_tx(
    input: InputRef,
    script_sig: &Script,
    sequence: Sequence,
    output_address: &Address,
    property_id: u32,
    amount: u64,
) -> Transaction {
    let mut output = vec![];
    if property_id == BTC_PROPERTY_ID {
        output.push(TxOut {
            value: amount,
            script_pubkey: output_address.script_pubkey(),
        });
    } else {
        output.push(TxOut {
            value: 0,
            script_pubkey: output_address.script_pubkey(),
        });
        output.push(TxOut {
            value: 0,
            script_pubkey: omni_simple_send(property_id, amount),
        });
    }
    Transaction {
        version: 2,
        lock_time: PackedLockTime(0),
        input: vec![TxIn {
            previous_output: input.outpoint(),
            script_sig: script_sig.clone(),
            sequence,
            witness: empty!(),
        }],
        output,
    }
}

impl RevocableDeliveryTransaction {
    pub fn unsigned_tx(&self) -> Transaction {
        spending_tx(
            self.input,
            &self.script_sig,
            Sequence::from_height(self.sequence),
            &self.output_address,
            self.property_id,
            self.amount,
        )
    }
}

impl BreachRemedyTransaction {
    pub fn unsigned_tx(&self) -> Transaction {
        spending_tx(
            self.input,
            &self.script_sig,
            Sequence::MAX,
            &self.output_address,
            self.property_id,
            self.amount,
        )
    }
}

fn rsmc_input(commitment: &CommitmentTransaction) -> InputRef {
    InputRef {
        txid: commitment.txid(),
        vout: 0,
        amount: commitment.amount_to_rsmc,
    }
}

/// Manages revocation secrets of superseded commitments and builds the
/// transactions spending commitment RSMC outputs
pub struct RevocationManager {
    store: Arc<dyn PersistenceStore>,
    custody: Arc<dyn KeyCustody>,
}

impl RevocationManager {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        custody: Arc<dyn KeyCustody>,
    ) -> Self {
        RevocationManager { store, custody }
    }

    fn commitment(
        &self,
        id: CommitmentId,
    ) -> Result<CommitmentTransaction, Error> {
        self.store
            .commitment(id)?
            .ok_or_else(|| StateError::UnknownCommitment(id).into())
    }

    /// Revokes commitment superseded by the signed commitment `new_id` of
    /// the `owner`, disclosing its RSMC temporary secret to the counterparty.
    ///
    /// The disclosure record is persisted before the superseded commitment
    /// is marked revoked, and the RSMC keys are discarded last. A repeated
    /// call completes a partially failed revocation, reusing the persisted
    /// disclosure; if the commitment was already revoked it fails with
    /// [`StateError::AlreadyRevoked`] after the completion.
    pub fn retire_previous(
        &self,
        channel: &ChannelInfo,
        owner: &PeerId,
        new_id: CommitmentId,
    ) -> Result<RevocationSecret, Error> {
        let new = self.commitment(new_id)?;
        if new.state != CommitmentState::Signed {
            return Err(StateError::CommitmentStateMismatch {
                id: new_id,
                current: new.state,
                required: CommitmentState::Signed,
            }
            .into());
        }
        let prior_id = new
            .supersedes
            .ok_or(StateError::NoPriorCommitment(new_id))?;
        let mut prior = self.commitment(prior_id)?;
        match prior.state {
            CommitmentState::Signed | CommitmentState::Revoked => {}
            current => {
                return Err(StateError::CommitmentStateMismatch {
                    id: prior_id,
                    current,
                    required: CommitmentState::Signed,
                }
                .into())
            }
        }

        let record = match self.store.revocation(prior_id)? {
            Some(record) => record,
            None => {
                let record = self.disclose(channel, owner, &prior)?;
                self.store.upsert_revocation(&record)?;
                record
            }
        };
        let already_revoked = prior.state == CommitmentState::Revoked;
        if !already_revoked {
            prior.state = CommitmentState::Revoked;
            prior.edited_at = Utc::now();
            self.store.upsert_commitment(&prior)?;
        }
        self.store.discard_delivery(prior_id)?;
        for pubkey in prior.temp_pubkeys() {
            self.custody.discard(&pubkey);
        }
        if already_revoked {
            return Err(StateError::AlreadyRevoked(prior_id).into());
        }
        info!(
            "Commitment {} of {} is revoked; secret is disclosed to {}",
            prior_id, owner, record.recipient
        );
        Ok(record)
    }

    /// Encrypts RSMC temporary secret of the commitment for the counterparty
    /// of its owner
    fn disclose(
        &self,
        channel: &ChannelInfo,
        owner: &PeerId,
        prior: &CommitmentTransaction,
    ) -> Result<RevocationSecret, Error> {
        let secret = self.custody.secret_for(&prior.rsmc_pubkey)?;
        if PublicKey::from_secret_key(SECP256K1, &secret) != prior.rsmc_pubkey
        {
            error!(
                "Custody returned secret not matching RSMC key of commitment \
                 {}",
                prior.id
            );
            return Err(Error::SecretMismatch {
                commitment: prior.id,
            });
        }
        let recipient = channel.counterparty(owner)?.clone();
        let recipient_pubkey = channel.pubkey_of(&recipient)?;
        let encrypted = encrypt_secret(&secret, &recipient_pubkey, prior.id)?;
        Ok(RevocationSecret {
            commitment_id: prior.id,
            channel_id: prior.channel_id,
            owner: owner.clone(),
            recipient,
            encrypted,
            disclosed_at: Utc::now(),
            acknowledged_at: None,
        })
    }

    /// Registers recipient confirmation of the disclosed secret
    pub fn acknowledge(
        &self,
        commitment_id: CommitmentId,
        by: &PeerId,
    ) -> Result<RevocationSecret, Error> {
        let mut record = self.disclosure(commitment_id)?;
        if *by != record.recipient {
            warn!(
                "Peer {} tried to acknowledge secret of commitment {} \
                 disclosed to {}",
                by, commitment_id, record.recipient
            );
            return Err(Error::Unauthorized(by.clone()));
        }
        if record.is_acknowledged() {
            return Err(StateError::AlreadyAcknowledged(commitment_id).into());
        }
        record.acknowledged_at = Some(Utc::now());
        self.store.upsert_revocation(&record)?;
        debug!("Secret of commitment {} is acknowledged", commitment_id);
        Ok(record)
    }

    /// Previously disclosed secret, for resending it without repeating the
    /// disclosure
    pub fn disclosure(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<RevocationSecret, Error> {
        self.store
            .revocation(commitment_id)?
            .ok_or_else(|| StateError::NoDisclosure(commitment_id).into())
    }

    /// Builds revocable delivery transaction of the signed commitment
    pub fn build_delivery(
        &self,
        commitment: &CommitmentTransaction,
        channel: &ChannelInfo,
    ) -> Result<RevocableDeliveryTransaction, Error> {
        match commitment.state {
            CommitmentState::Signed => {}
            CommitmentState::Revoked => {
                return Err(StateError::AlreadyRevoked(commitment.id).into())
            }
            current => {
                return Err(StateError::CommitmentStateMismatch {
                    id: commitment.id,
                    current,
                    required: CommitmentState::Signed,
                }
                .into())
            }
        }
        let delivery = RevocableDeliveryTransaction {
            commitment_id: commitment.id,
            channel_id: commitment.channel_id,
            owner: commitment.owner.clone(),
            property_id: commitment.property_id,
            input: rsmc_input(commitment),
            script_sig: nested_script_sig(&commitment.rsmc_redeem_script),
            output_address: channel.address_of(&commitment.owner)?.clone(),
            sequence: channel.to_self_delay(&commitment.owner),
            amount: commitment.amount_to_rsmc,
            created_at: Utc::now(),
        };
        self.store.upsert_delivery(&delivery)?;
        debug!(
            "Revocable delivery of commitment {} locked for {} blocks",
            commitment.id, delivery.sequence
        );
        Ok(delivery)
    }

    /// Builds breach remedy transaction of the revoked commitment, giving
    /// all its RSMC funds to the counterparty of the owner
    pub fn build_breach_remedy(
        &self,
        commitment: &CommitmentTransaction,
        channel: &ChannelInfo,
        disclosed_secret: &SecretKey,
    ) -> Result<BreachRemedyTransaction, Error> {
        if commitment.state != CommitmentState::Revoked {
            return Err(StateError::NotRevoked(commitment.id).into());
        }
        if PublicKey::from_secret_key(SECP256K1, disclosed_secret)
            != commitment.rsmc_pubkey
        {
            error!(
                "Secret provided for breach remedy does not match RSMC key of \
                 commitment {}",
                commitment.id
            );
            return Err(Error::SecretMismatch {
                commitment: commitment.id,
            });
        }
        let beneficiary = channel.counterparty(&commitment.owner)?.clone();
        let breach_remedy = BreachRemedyTransaction {
            commitment_id: commitment.id,
            channel_id: commitment.channel_id,
            cheater: commitment.owner.clone(),
            output_address: channel.address_of(&beneficiary)?.clone(),
            beneficiary,
            property_id: commitment.property_id,
            input: rsmc_input(commitment),
            script_sig: nested_script_sig(&commitment.rsmc_redeem_script),
            amount: commitment.amount_to_rsmc,
            created_at: Utc::now(),
        };
        self.store.upsert_breach_remedy(&breach_remedy)?;
        info!(
            "Breach remedy of commitment {} pays {} to {}",
            commitment.id, breach_remedy.amount, breach_remedy.beneficiary
        );
        Ok(breach_remedy)
    }

    /// Decrypts secret disclosed to the peer owning `recipient_secret`
    #[inline]
    pub fn decrypt_secret(
        &self,
        encrypted: &EncryptedSecret,
        recipient_secret: &SecretKey,
    ) -> Result<SecretKey, Error> {
        decrypt_secret(encrypted, recipient_secret).map_err(Error::from)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use bitcoin::{Network, Witness};

    use super::*;
    use crate::commitment::{CommitmentEngine, InputSource, Split};
    use crate::session::Session;
    use crate::store::StoreError;
    use crate::test_utils::{
        active_channel, alice, bob, dumb_signature, p2pkh, pubkey, secret,
        FlakyStore, MockChain,
    };

    struct Fixture {
        store: Arc<FlakyStore>,
        session: Arc<Session>,
        engine: CommitmentEngine,
        revocation: RevocationManager,
        channel: ChannelInfo,
    }

    impl Fixture {
        /// Alice holds two signed commitments: 60/40 superseded by 55/45
        fn with_update() -> (Self, [CommitmentTransaction; 2]) {
            let store = Arc::new(FlakyStore::default());
            let session = Arc::new(Session::new());
            let (channel, funding) = active_channel(&store.inner, 100);
            let engine = CommitmentEngine::new(
                Arc::new(MockChain::default()),
                store.clone(),
                10,
            );
            let revocation =
                RevocationManager::new(store.clone(), session.clone());

            let first = engine
                .build_commitment(
                    &alice(),
                    &channel,
                    InputSource::Funding(funding),
                    Split {
                        to_rsmc: 60,
                        to_other: 40,
                        to_htlc: 0,
                        rsmc_pubkey: session.generate(),
                        htlc_pubkey: None,
                    },
                )
                .unwrap();
            let first = engine.mark_signed(first.id, dumb_signature()).unwrap();
            revocation.build_delivery(&first, &channel).unwrap();

            let second = engine
                .build_commitment(
                    &alice(),
                    &channel,
                    InputSource::Previous(first.id),
                    Split {
                        to_rsmc: 55,
                        to_other: 45,
                        to_htlc: 0,
                        rsmc_pubkey: session.generate(),
                        htlc_pubkey: None,
                    },
                )
                .unwrap();
            let second =
                engine.mark_signed(second.id, dumb_signature()).unwrap();

            let fixture = Fixture {
                store,
                session,
                engine,
                revocation,
                channel,
            };
            (fixture, [first, second])
        }

        fn reload(&self, id: CommitmentId) -> CommitmentTransaction {
            self.store.commitment(id).unwrap().unwrap()
        }

        fn signed(
            &self,
            owner: &PeerId,
            source: InputSource,
            to_rsmc: u64,
        ) -> CommitmentTransaction {
            let split = Split {
                to_rsmc,
                to_other: 100 - to_rsmc,
                to_htlc: 0,
                rsmc_pubkey: self.session.generate(),
                htlc_pubkey: None,
            };
            let commitment = self
                .engine
                .build_commitment(owner, &self.channel, source, split)
                .unwrap();
            self.engine
                .mark_signed(commitment.id, dumb_signature())
                .unwrap()
        }

        /// Bob signs 40/60 superseded by 45/55 and revokes the first one
        fn bob_revoked(&self) -> (CommitmentTransaction, RevocationSecret) {
            let channel_id = self.channel.channel_id().unwrap();
            let funding = self.store.funding(channel_id).unwrap().unwrap();
            let first = self.signed(&bob(), InputSource::Funding(funding), 40);
            let second =
                self.signed(&bob(), InputSource::Previous(first.id), 45);
            let record = self
                .revocation
                .retire_previous(&self.channel, &bob(), second.id)
                .unwrap();
            (self.reload(first.id), record)
        }
    }

    #[test]
    fn delivery() {
        let (fixture, [first, _]) = Fixture::with_update();
        let delivery = fixture.store.delivery(first.id).unwrap().unwrap();
        assert_eq!(delivery.owner, alice());
        assert_eq!(delivery.amount, 60);
        assert_eq!(delivery.sequence, fixture.channel.to_self_delay(&alice()));
        assert_eq!(delivery.output_address, p2pkh(&pubkey(1)));
        assert_eq!(delivery.input.txid, first.txid());
        assert_eq!(delivery.input.vout, 0);
        let tx = delivery.unsigned_tx();
        assert_eq!(tx.input[0].sequence.0, delivery.sequence as u32);
    }

    #[test]
    fn retire_previous() {
        let (fixture, [first, second]) = Fixture::with_update();
        let record = fixture
            .revocation
            .retire_previous(&fixture.channel, &alice(), second.id)
            .unwrap();
        assert_eq!(record.commitment_id, first.id);
        assert_eq!(record.recipient, bob());
        assert!(!record.is_acknowledged());

        assert_eq!(fixture.reload(first.id).state, CommitmentState::Revoked);
        assert_eq!(fixture.reload(second.id).state, CommitmentState::Signed);
        assert_eq!(fixture.store.delivery(first.id).unwrap(), None);
        assert!(fixture.session.secret_for(&first.rsmc_pubkey).is_err());
        assert!(fixture.session.secret_for(&second.rsmc_pubkey).is_ok());

        let revealed = fixture
            .revocation
            .decrypt_secret(&record.encrypted, &secret(2))
            .unwrap();
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &revealed),
            first.rsmc_pubkey
        );
        assert!(fixture
            .revocation
            .decrypt_secret(&record.encrypted, &secret(1))
            .is_err());

        assert_eq!(
            fixture.revocation.retire_previous(
                &fixture.channel,
                &alice(),
                second.id
            ),
            Err(StateError::AlreadyRevoked(first.id).into())
        );
        assert_eq!(fixture.revocation.disclosure(first.id), Ok(record));
    }

    #[test]
    fn initial_commitment_has_no_prior() {
        let (fixture, [first, _]) = Fixture::with_update();
        assert_eq!(
            fixture.revocation.retire_previous(
                &fixture.channel,
                &alice(),
                first.id
            ),
            Err(StateError::NoPriorCommitment(first.id).into())
        );
        assert_eq!(
            fixture.revocation.disclosure(first.id),
            Err(StateError::NoDisclosure(first.id).into())
        );
    }

    #[test]
    fn acknowledge() {
        let (fixture, [first, second]) = Fixture::with_update();
        fixture
            .revocation
            .retire_previous(&fixture.channel, &alice(), second.id)
            .unwrap();
        assert_eq!(
            fixture.revocation.acknowledge(first.id, &alice()),
            Err(Error::Unauthorized(alice()))
        );
        let record = fixture.revocation.acknowledge(first.id, &bob()).unwrap();
        assert!(record.is_acknowledged());
        assert_eq!(
            fixture.revocation.acknowledge(first.id, &bob()),
            Err(StateError::AlreadyAcknowledged(first.id).into())
        );
    }

    #[test]
    fn breach_remedy() {
        let (fixture, [first, second]) = Fixture::with_update();
        let (bob_revoked, bob_record) = fixture.bob_revoked();
        assert_eq!(bob_record.recipient, alice());
        let bob_secret = fixture
            .revocation
            .decrypt_secret(&bob_record.encrypted, &secret(1))
            .unwrap();
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &bob_secret),
            bob_revoked.rsmc_pubkey
        );
        assert_eq!(
            fixture.revocation.build_breach_remedy(
                &first,
                &fixture.channel,
                &bob_secret
            ),
            Err(StateError::NotRevoked(first.id).into())
        );

        let record = fixture
            .revocation
            .retire_previous(&fixture.channel, &alice(), second.id)
            .unwrap();
        let revealed = fixture
            .revocation
            .decrypt_secret(&record.encrypted, &secret(2))
            .unwrap();
        let revoked = fixture.reload(first.id);
        assert_eq!(
            fixture.revocation.build_delivery(&revoked, &fixture.channel),
            Err(StateError::AlreadyRevoked(first.id).into())
        );
        assert_eq!(
            fixture.revocation.build_breach_remedy(
                &revoked,
                &fixture.channel,
                &bob_secret
            ),
            Err(Error::SecretMismatch {
                commitment: first.id
            })
        );
        assert_eq!(fixture.store.breach_remedy(first.id), Ok(None));

        let breach_remedy = fixture
            .revocation
            .build_breach_remedy(&revoked, &fixture.channel, &revealed)
            .unwrap();
        assert_eq!(breach_remedy.amount, 60);
        assert_eq!(breach_remedy.cheater, alice());
        assert_eq!(breach_remedy.beneficiary, bob());
        assert_eq!(breach_remedy.output_address, p2pkh(&pubkey(2)));
        assert_eq!(
            fixture.store.breach_remedy(first.id).unwrap(),
            Some(breach_remedy)
        );
        assert_eq!(
            fixture.engine.latest_signed(first.channel_id, &alice()),
            Ok(second)
        );
    }

    #[test]
    fn failed_disclosure_write() {
        let (fixture, [first, second]) = Fixture::with_update();
        fixture.store.fail_revocations.store(true, Ordering::SeqCst);
        assert_eq!(
            fixture.revocation.retire_previous(
                &fixture.channel,
                &alice(),
                second.id
            ),
            Err(StoreError::Backend(s!("disk full")).into())
        );
        assert_eq!(fixture.reload(first.id).state, CommitmentState::Signed);
        assert_eq!(
            fixture.revocation.disclosure(first.id),
            Err(StateError::NoDisclosure(first.id).into())
        );
        assert!(fixture.store.delivery(first.id).unwrap().is_some());
        assert!(fixture.session.secret_for(&first.rsmc_pubkey).is_ok());

        fixture.store.fail_revocations.store(false, Ordering::SeqCst);
        let record = fixture
            .revocation
            .retire_previous(&fixture.channel, &alice(), second.id)
            .unwrap();
        assert_eq!(fixture.reload(first.id).state, CommitmentState::Revoked);
        assert_eq!(fixture.revocation.disclosure(first.id), Ok(record));
        assert!(fixture.session.secret_for(&first.rsmc_pubkey).is_err());
    }

    #[test]
    fn failed_revoked_state_write() {
        let (fixture, [first, second]) = Fixture::with_update();
        fixture.store.fail_commitments.store(true, Ordering::SeqCst);
        assert_eq!(
            fixture.revocation.retire_previous(
                &fixture.channel,
                &alice(),
                second.id
            ),
            Err(StoreError::Backend(s!("disk full")).into())
        );
        assert_eq!(fixture.reload(first.id).state, CommitmentState::Signed);
        let persisted = fixture.revocation.disclosure(first.id).unwrap();
        assert!(fixture.session.secret_for(&first.rsmc_pubkey).is_ok());

        fixture.store.fail_commitments.store(false, Ordering::SeqCst);
        let record = fixture
            .revocation
            .retire_previous(&fixture.channel, &alice(), second.id)
            .unwrap();
        assert_eq!(record, persisted);
        assert_eq!(fixture.reload(first.id).state, CommitmentState::Revoked);
        assert_eq!(fixture.store.delivery(first.id).unwrap(), None);
        assert!(fixture.session.secret_for(&first.rsmc_pubkey).is_err());

        let revealed = fixture
            .revocation
            .decrypt_secret(&record.encrypted, &secret(2))
            .unwrap();
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &revealed),
            first.rsmc_pubkey
        );
    }

    #[test]
    fn signing_keeps_txid() {
        let (fixture, [first, _]) = Fixture::with_update();
        let redeem_script = fixture.channel.redeem_script().unwrap();
        assert_eq!(
            fixture.channel.channel_address,
            Some(Address::p2shwsh(redeem_script, Network::Testnet))
        );
        let signature = dumb_signature().serialize_der().to_vec();

        let mut tx = first.unsigned_tx();
        assert_eq!(tx.input[0].script_sig, nested_script_sig(redeem_script));
        tx.input[0].witness = Witness::from_vec(vec![
            vec![],
            signature.clone(),
            signature.clone(),
            redeem_script.to_bytes(),
        ]);
        assert_eq!(tx.txid(), first.txid());

        let delivery = fixture.store.delivery(first.id).unwrap().unwrap();
        assert_eq!(delivery.input.outpoint().txid, tx.txid());
        let mut spending = delivery.unsigned_tx();
        let unsigned_txid = spending.txid();
        assert_eq!(
            spending.input[0].script_sig,
            nested_script_sig(&first.rsmc_redeem_script)
        );
        spending.input[0].witness = Witness::from_vec(vec![
            vec![],
            signature.clone(),
            signature,
            first.rsmc_redeem_script.to_bytes(),
        ]);
        assert_eq!(spending.txid(), unsigned_txid);
    }
}
