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


//! Fixtures shared by the unit tests

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2};
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, Txid};
use chrono::Utc;
use p2p::{
    AcceptChannel, ActiveChannelId, ChannelId, CloseChannel, CommitmentId,
    CommitmentTx, CommitmentTxSigned, Envelope, FundingCreated, FundingSigned,
    GetBalanceRequest, Messages, OpenChannel, PeerId, RevocationAck,
    TempChannelId, USDT_PROPERTY_ID,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::chain::{
    AddressInfo, AssetTransfer, ChainError, ChainService, DecodedTx,
    MultisigInfo, PropertyInfo, TxInputRef, TxOutputInfo,
};
use crate::channel::{
    ChannelInfo, CommonParams, FundingTransaction, Lifecycle, PeerParams,
};
use crate::commitment::CommitmentTransaction;
use crate::revocation::{
    BreachRemedyTransaction, RevocableDeliveryTransaction, RevocationSecret,
};
use crate::store::{MemoryStore, PersistenceStore, StoreError};
use crate::{ChannelHub, Config, Error, Session};

pub fn secret(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).unwrap()
}

pub fn pubkey(seed: u8) -> PublicKey {
    PublicKey::from_secret_key(SECP256K1, &secret(seed))
}

pub fn p2pkh(pubkey: &PublicKey) -> Address {
    Address::p2pkh(&bitcoin::PublicKey::new(*pubkey), Network::Testnet)
}

pub fn sign(message: &Message, seed: u8) -> Signature {
    SECP256K1.sign_ecdsa(message, &secret(seed))
}

/// Signature which is replaced once the signed message is complete
pub fn dumb_signature() -> Signature {
    sign(&Message::from_slice(&[0xAB; 32]).unwrap(), 0xAB)
}

pub fn alice() -> PeerId {
    PeerId::from("alice")
}

pub fn bob() -> PeerId {
    PeerId::from("bob")
}

pub fn carol() -> PeerId {
    PeerId::from("carol")
}

/// Seed of the funding key of a test peer
pub fn seed_of(peer: &PeerId) -> u8 {
    match peer.to_string().as_str() {
        "alice" => 1,
        "bob" => 2,
        _ => 3,
    }
}

pub fn multisig(pubkeys: &[PublicKey]) -> MultisigInfo {
    let redeem_script = pubkeys
        .iter()
        .fold(Builder::new().push_opcode(OP_PUSHNUM_2), |builder, pk| {
            builder.push_slice(&pk.serialize())
        })
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    MultisigInfo {
        address: Address::p2shwsh(&redeem_script, Network::Testnet),
        redeem_script,
    }
}

fn unknown(call: &'static str, what: impl ToString) -> ChainError {
    ChainError::Rpc {
        call,
        details: format!("unknown {}", what.to_string()),
    }
}

/// Chain node answering from the registered transactions. Signatures are
/// verified for real.
#[derive(Default)]
pub struct MockChain {
    txs: Mutex<HashMap<String, DecodedTx>>,
    transfers: Mutex<HashMap<String, AssetTransfer>>,
    raw: Mutex<HashMap<Txid, String>>,
}

impl MockChain {
    pub fn add_tx(&self, hex: &str, tx: DecodedTx) {
        self.raw.lock().unwrap().insert(tx.txid, hex.to_owned());
        self.txs.lock().unwrap().insert(hex.to_owned(), tx);
    }

    pub fn add_transfer(&self, hex: &str, transfer: AssetTransfer) {
        self.transfers
            .lock()
            .unwrap()
            .insert(hex.to_owned(), transfer);
    }

    /// Registers transaction transferring `amount` of USDT from `from` to
    /// the channel address `to`
    pub fn add_asset_funding(
        &self,
        hex: &str,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Txid {
        let txid = Txid::hash(hex.as_bytes());
        self.add_tx(hex, DecodedTx {
            txid,
            inputs: vec![TxInputRef {
                txid: Txid::hash(b"asset input"),
                vout: 0,
            }],
            outputs: vec![TxOutputInfo {
                n: 0,
                value: 546,
                addresses: vec![to.to_string()],
                script_pubkey: to.script_pubkey(),
            }],
        });
        self.add_transfer(hex, AssetTransfer {
            txid,
            sending_address: from.to_string(),
            reference_address: to.to_string(),
            amount,
            property_id: USDT_PROPERTY_ID,
        });
        txid
    }
}

impl ChainService for MockChain {
    fn derive_multisig(
        &self,
        pubkeys: &[PublicKey],
    ) -> Result<MultisigInfo, ChainError> {
        Ok(multisig(pubkeys))
    }

    fn address_info(
        &self,
        address: &Address,
    ) -> Result<AddressInfo, ChainError> {
        Ok(AddressInfo {
            address: address.clone(),
            script_pubkey: address.script_pubkey(),
        })
    }

    fn decode_transaction(&self, hex: &str) -> Result<DecodedTx, ChainError> {
        self.txs
            .lock()
            .unwrap()
            .get(hex)
            .cloned()
            .ok_or_else(|| unknown("decoderawtransaction", hex))
    }

    fn decode_asset_transfer(
        &self,
        hex: &str,
    ) -> Result<AssetTransfer, ChainError> {
        self.transfers
            .lock()
            .unwrap()
            .get(hex)
            .cloned()
            .ok_or_else(|| unknown("omni_decodetransaction", hex))
    }

    fn validate_address(
        &self,
        address: &str,
    ) -> Result<Option<Address>, ChainError> {
        Ok(Address::from_str(address).ok())
    }

    fn transaction_by_id(&self, txid: Txid) -> Result<String, ChainError> {
        self.raw
            .lock()
            .unwrap()
            .get(&txid)
            .cloned()
            .ok_or_else(|| unknown("getrawtransaction", txid))
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
        match property_id {
            USDT_PROPERTY_ID => Ok(PropertyInfo {
                property_id,
                name: s!("TetherUS"),
                divisible: true,
            }),
            other => Err(unknown("omni_getproperty", other)),
        }
    }
}

/// [`MemoryStore`] which fails commitment or revocation writes on demand
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_commitments: AtomicBool,
    pub fail_revocations: AtomicBool,
}

impl FlakyStore {
    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(s!("disk full")));
        }
        Ok(())
    }
}

impl PersistenceStore for FlakyStore {
    fn upsert_channel(&self, channel: &ChannelInfo) -> Result<(), StoreError> {
        self.inner.upsert_channel(channel)
    }

    fn channel(
        &self,
        id: ActiveChannelId,
    ) -> Result<Option<ChannelInfo>, StoreError> {
        self.inner.channel(id)
    }

    fn upsert_funding(
        &self,
        funding: &FundingTransaction,
    ) -> Result<(), StoreError> {
        self.inner.upsert_funding(funding)
    }

    fn funding(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<FundingTransaction>, StoreError> {
        self.inner.funding(channel_id)
    }

    fn upsert_commitment(
        &self,
        commitment: &CommitmentTransaction,
    ) -> Result<(), StoreError> {
        self.check(&self.fail_commitments)?;
        self.inner.upsert_commitment(commitment)
    }

    fn commitment(
        &self,
        id: CommitmentId,
    ) -> Result<Option<CommitmentTransaction>, StoreError> {
        self.inner.commitment(id)
    }

    fn commitments(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<CommitmentTransaction>, StoreError> {
        self.inner.commitments(channel_id)
    }

    fn upsert_delivery(
        &self,
        delivery: &RevocableDeliveryTransaction,
    ) -> Result<(), StoreError> {
        self.inner.upsert_delivery(delivery)
    }

    fn delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError> {
        self.inner.delivery(commitment_id)
    }

    fn discard_delivery(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocableDeliveryTransaction>, StoreError> {
        self.inner.discard_delivery(commitment_id)
    }

    fn upsert_breach_remedy(
        &self,
        breach_remedy: &BreachRemedyTransaction,
    ) -> Result<(), StoreError> {
        self.inner.upsert_breach_remedy(breach_remedy)
    }

    fn breach_remedy(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<BreachRemedyTransaction>, StoreError> {
        self.inner.breach_remedy(commitment_id)
    }

    fn upsert_revocation(
        &self,
        secret: &RevocationSecret,
    ) -> Result<(), StoreError> {
        self.check(&self.fail_revocations)?;
        self.inner.upsert_revocation(secret)
    }

    fn revocation(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Option<RevocationSecret>, StoreError> {
        self.inner.revocation(commitment_id)
    }
}

/// Active channel funded by alice with `amount` of USDT, recorded in the
/// store
pub fn active_channel(
    store: &dyn PersistenceStore,
    amount: u64,
) -> (ChannelInfo, FundingTransaction) {
    let multisig = multisig(&[pubkey(1), pubkey(2)]);
    let channel_id = ChannelId::with(&multisig.address);
    let now = Utc::now();
    let channel = ChannelInfo {
        temporary_channel_id: TempChannelId::random(),
        channel_id: Some(channel_id),
        peer_a: alice(),
        peer_b: bob(),
        pubkey_a: pubkey(1),
        pubkey_b: Some(pubkey(2)),
        address_a: p2pkh(&pubkey(1)),
        address_b: Some(p2pkh(&pubkey(2))),
        channel_address: Some(multisig.address),
        redeem_script: Some(multisig.redeem_script),
        property_id: USDT_PROPERTY_ID,
        funding_amount: amount,
        push_amount: 0,
        common_params: CommonParams {
            minimum_depth: 3,
            feerate_per_kw: 1,
            property_id: USDT_PROPERTY_ID,
        },
        params_a: PeerParams::default(),
        params_b: Some(PeerParams::default()),
        lifecycle: Lifecycle::Active,
        close_initiator: None,
        close_reason: None,
        created_at: now,
        edited_at: now,
    };
    let funding = FundingTransaction {
        channel_id,
        txid: Txid::hash(b"funding"),
        output_index: 0,
        property_id: USDT_PROPERTY_ID,
        amount_a: amount,
        amount_b: 0,
        funder_signature: None,
        created_at: now,
    };
    store.upsert_channel(&channel).unwrap();
    store.upsert_funding(&funding).unwrap();
    (channel, funding)
}

/// `open_channel` of alice acceptable under the default policy
pub fn open_channel(funding: u64, push: u64) -> OpenChannel {
    OpenChannel {
        chain_hash: Config::default().chain_hash(),
        temporary_channel_id: TempChannelId::random(),
        property_id: USDT_PROPERTY_ID,
        funding_satoshis: funding,
        push_msat: push * 1000,
        dust_limit_satoshis: 354,
        max_htlc_value_in_flight_msat: 10000,
        channel_reserve_satoshis: funding / 10,
        htlc_minimum_msat: 10,
        feerate_per_kw: 1,
        to_self_delay: 144,
        max_accepted_htlcs: 483,
        funding_pubkey: pubkey(1),
        revocation_basepoint: pubkey(11),
        payment_point: pubkey(12),
        delayed_payment_basepoint: pubkey(13),
        htlc_basepoint: pubkey(14),
    }
}

/// `accept_channel` of bob acceptable under the default policy
pub fn accept_channel(temp_id: TempChannelId) -> AcceptChannel {
    AcceptChannel {
        temporary_channel_id: temp_id,
        dust_limit_satoshis: 354,
        max_htlc_value_in_flight_msat: 10000,
        channel_reserve_satoshis: 10000,
        htlc_minimum_msat: 10,
        minimum_depth: 3,
        to_self_delay: 72,
        max_accepted_htlcs: 483,
        funding_pubkey: pubkey(2),
        revocation_basepoint: pubkey(21),
        payment_point: pubkey(22),
        delayed_payment_basepoint: pubkey(23),
        htlc_basepoint: pubkey(24),
    }
}

/// Hub with alice and bob online, talking to a [`MockChain`]
pub struct HubFixture {
    pub hub: ChannelHub,
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub session: Arc<Session>,
}

impl HubFixture {
    pub fn new() -> Self {
        let chain = Arc::new(MockChain::default());
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(Session::new());
        session.set_online(alice(), true);
        session.set_online(bob(), true);
        HubFixture {
            hub: ChannelHub::new(
                Config::default(),
                chain.clone(),
                store.clone(),
                session.clone(),
            ),
            chain,
            store,
            session,
        }
    }

    pub fn send(
        &self,
        sender: &PeerId,
        recipient: &PeerId,
        message: impl Into<Messages>,
    ) -> Result<Vec<Envelope>, Error> {
        let envelope = message
            .into()
            .to_envelope(sender.clone(), recipient.clone())
            .unwrap();
        self.hub.process(&envelope)
    }

    /// Proposes and accepts channel funded by alice
    pub fn open(&self, funding: u64, push: u64) -> TempChannelId {
        let open_channel = open_channel(funding, push);
        let temp_id = open_channel.temporary_channel_id;
        self.send(&alice(), &bob(), open_channel).unwrap();
        self.send(&bob(), &alice(), accept_channel(temp_id)).unwrap();
        temp_id
    }

    /// Signed `funding_created` of alice, with the funding transaction
    /// registered in the chain node
    pub fn funding_created(&self, temp_id: TempChannelId) -> FundingCreated {
        let channel = self.hub.registry().draft(temp_id).unwrap();
        let funding_tx_hex = format!("0200{}", temp_id);
        self.chain.add_asset_funding(
            &funding_tx_hex,
            &channel.address_a,
            channel.channel_address().unwrap(),
            channel.funding_amount,
        );
        let mut funding_created = FundingCreated {
            temporary_channel_id: temp_id,
            funder_pubkey: pubkey(1),
            property_id: USDT_PROPERTY_ID,
            amount_a: channel.funding_amount - channel.push_amount,
            funding_tx_hex,
            funder_signature: dumb_signature(),
        };
        funding_created.funder_signature =
            sign(&funding_created.signing_message(), 1);
        funding_created
    }

    /// Signed `funding_signed` of bob
    pub fn funding_signed(&self, temp_id: TempChannelId) -> FundingSigned {
        let channel = self.hub.registry().draft(temp_id).unwrap();
        let mut funding_signed = FundingSigned {
            temporary_channel_id: temp_id,
            funder_pubkey: pubkey(1),
            property_id: USDT_PROPERTY_ID,
            amount_a: channel.funding_amount - channel.push_amount,
            fundee_pubkey: pubkey(2),
            amount_b: channel.push_amount,
            fundee_signature: dumb_signature(),
            redeem_script: None,
            p2sh_address: None,
            channel_id: None,
        };
        funding_signed.fundee_signature =
            sign(&funding_signed.signing_message(), 2);
        funding_signed
    }

    /// Opens and funds channel, returning the reply of the hub to alice
    pub fn fund(&self, funding: u64, push: u64) -> FundingSigned {
        let temp_id = self.open(funding, push);
        self.send(&alice(), &bob(), self.funding_created(temp_id))
            .unwrap();
        let replies = self
            .send(&bob(), &alice(), self.funding_signed(temp_id))
            .unwrap();
        match replies[0].message().unwrap() {
            Messages::FundingSigned(funding_signed) => funding_signed,
            other => panic!("unexpected reply {}", other),
        }
    }

    /// Signed proposal superseding the latest signed commitment of the payer
    pub fn commitment_tx(
        &self,
        channel_id: ChannelId,
        payer: &PeerId,
        amount: u64,
    ) -> CommitmentTx {
        let latest =
            self.hub.engine().latest_signed(channel_id, payer).unwrap();
        let mut commitment_tx = CommitmentTx {
            channel_id,
            property_id: USDT_PROPERTY_ID,
            amount,
            commitment_number: latest.number + 1,
            signature: None,
            encrypted_revocation_secret: None,
        };
        commitment_tx.signature =
            Some(sign(&commitment_tx.signing_message(), seed_of(payer)));
        commitment_tx
    }

    /// Signed acceptance of the update in flight
    pub fn commitment_tx_signed(
        &self,
        channel_id: ChannelId,
        payee: &PeerId,
        amount: u64,
    ) -> CommitmentTxSigned {
        let update = self.hub.pending_update(channel_id).unwrap();
        let mut signed = CommitmentTxSigned {
            channel_id,
            property_id: USDT_PROPERTY_ID,
            amount,
            commitment_number: update.commitment_number,
            receiver_signature: dumb_signature(),
        };
        signed.receiver_signature =
            sign(&signed.signing_message(), seed_of(payee));
        signed
    }

    /// Proposes and signs payment, returning the revocation disclosures
    /// produced by the hub
    pub fn sign_payment(
        &self,
        channel_id: ChannelId,
        payer: &PeerId,
        payee: &PeerId,
        amount: u64,
    ) -> Vec<Envelope> {
        self.send(payer, payee, self.commitment_tx(channel_id, payer, amount))
            .unwrap();
        let replies = self
            .send(
                payee,
                payer,
                self.commitment_tx_signed(channel_id, payee, amount),
            )
            .unwrap();
        replies
            .into_iter()
            .filter(|envelope| {
                matches!(
                    envelope.message().unwrap(),
                    Messages::CommitmentTx(ref msg) if msg.is_disclosure()
                )
            })
            .collect()
    }

    /// Acknowledges the disclosures on behalf of their recipients
    pub fn acknowledge(&self, channel_id: ChannelId, disclosures: &[Envelope]) {
        for envelope in disclosures {
            let commitment_id = match envelope.message().unwrap() {
                Messages::CommitmentTx(CommitmentTx {
                    encrypted_revocation_secret: Some(encrypted),
                    ..
                }) => encrypted.commitment_id,
                other => panic!("not a disclosure: {}", other),
            };
            self.send(&envelope.recipient, &envelope.sender, RevocationAck {
                channel_id,
                commitment_id,
            })
            .unwrap();
        }
    }

    /// Completes payment including the acknowledgements
    pub fn pay(
        &self,
        channel_id: ChannelId,
        payer: &PeerId,
        payee: &PeerId,
        amount: u64,
    ) -> Vec<Envelope> {
        let disclosures = self.sign_payment(channel_id, payer, payee, amount);
        self.acknowledge(channel_id, &disclosures);
        disclosures
    }

    pub fn balance_request(
        &self,
        channel_id: ChannelId,
        who: &PeerId,
    ) -> GetBalanceRequest {
        let channel = self.hub.registry().active(channel_id).unwrap();
        let mut request = GetBalanceRequest {
            channel_id,
            p2sh_address: channel.channel_address().unwrap().clone(),
            property_id: USDT_PROPERTY_ID,
            who: who.clone(),
            signature: dumb_signature(),
        };
        request.signature = sign(&request.signing_message(), seed_of(who));
        request
    }

    pub fn close_channel(
        &self,
        channel_id: ChannelId,
        peer: &PeerId,
    ) -> CloseChannel {
        let seed = seed_of(peer);
        let mut close_channel = CloseChannel {
            channel_id,
            script_pubkey: p2pkh(&pubkey(seed)).script_pubkey(),
            signature: dumb_signature(),
        };
        close_channel.signature = sign(&close_channel.signing_message(), seed);
        close_channel
    }
}
