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

use bitcoin::{Address, BlockHash};
use p2p::{ActiveChannelId, ChannelId, CommitmentId, MessageType, PeerId};
use secp256k1::PublicKey;

use crate::chain::ChainError;
use crate::channel::{Lifecycle, PolicyError};
use crate::commitment::CommitmentState;
use crate::revocation::CryptoError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Malformed or mismatching data provided by a peer or returned by the chain
/// node. Never retried; reported to the proposing peer.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ValidationError {
    /// funding transaction input does not spend an output belonging to the
    /// funder address {expected}
    WrongInput { expected: Address },

    /// funding transaction has no output paying to the channel address
    /// {expected}
    WrongOutput { expected: Address },

    /// asset transfer is sent from {found} instead of the funder address
    /// {expected}
    WrongSender { expected: Address, found: String },

    /// asset transfer references {found} instead of the channel address
    /// {expected}
    WrongReference { expected: Address, found: String },

    /// asset {found} does not match channel asset {expected}
    WrongAsset { expected: u32, found: u32 },

    /// amount {found} does not match the expected amount {expected}
    AmountMismatch { expected: u64, found: u64 },

    /// peer {0} is not the channel funder
    WrongFunder(PeerId),

    /// funding public key {found} does not match the key {expected} known for
    /// the channel peer
    KeyMismatch {
        expected: PublicKey,
        found: PublicKey,
    },

    /// channel can't be opened by peer {0} with itself
    SamePeers(PeerId),

    /// message is addressed to {found} while it must be sent to {expected}
    WrongRecipient { expected: PeerId, found: PeerId },

    /// peer {0} is not a participant of the channel
    NotParticipant(PeerId),

    /// peer {0} is offline
    PeerOffline(PeerId),

    /// channel is proposed for the chain {found}, while the node operates on
    /// {expected}
    ChainMismatch {
        expected: BlockHash,
        found: BlockHash,
    },

    /// chain node considers address {0} invalid
    InvalidAddress(String),

    /// channel address {found} does not match the channel multisig address
    /// {expected}
    ChannelAddressMismatch { expected: Address, found: Address },

    /// redeem script does not match the channel multisig
    RedeemScriptMismatch,

    /// channel id {found} does not match channel id {expected}
    ChannelIdMismatch { expected: ChannelId, found: ChannelId },

    /// commitment outputs of {outputs} exceed commitment input of {input}
    Overspend { input: u64, outputs: u64 },

    /// commitment fee {fee} exceeds maximum allowed fee of {max}
    FeeTooHigh { fee: u64, max: u64 },

    /// HTLC amount and HTLC temporary key must be provided together
    HtlcMismatch,

    /// payment amount must be positive
    ZeroPayment,

    /// requested payment of {requested} exceeds available balance of
    /// {available}
    InsufficientFunds { available: u64, requested: u64 },

    /// message is not signed
    MissingSignature,

    /// unexpected `{0}` message
    UnexpectedMessage(MessageType),

    /// chain node returned malformed response to `{call}`: field `{field}`
    /// is missing or invalid
    Malformed {
        call: &'static str,
        field: &'static str,
    },
}

/// Operation is not compatible with the current state of a channel or a
/// commitment. The caller must resynchronize the state before retrying.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StateError {
    /// channel {channel} is in a state {current} incompatible with the
    /// requested operation
    LifecycleMismatch {
        channel: ActiveChannelId,
        current: Lifecycle,
        required: &'static [Lifecycle],
    },

    /// channel {0} already exists
    DuplicateChannel(ActiveChannelId),

    /// channel {0} is not known
    UnknownChannel(ActiveChannelId),

    /// channel {0} does not have permanent channel id assigned yet
    NoChannelId(ActiveChannelId),

    /// funding of channel {0} is already recorded
    FundingRecorded(ChannelId),

    /// funding of channel {0} is not known
    NoFunding(ChannelId),

    /// channel {0} has another commitment update in progress
    Busy(ChannelId),

    /// channel {0} has no commitment update in progress
    NoUpdate(ChannelId),

    /// commitment update of channel {0} is already signed and can only be
    /// completed
    UpdateSigned(ChannelId),

    /// close of channel {0} was already requested by the peer
    CloseRequested(ChannelId),

    /// commitment {0} is not known
    UnknownCommitment(CommitmentId),

    /// commitment {id} is in state {current} while the operation requires
    /// {required}
    CommitmentStateMismatch {
        id: CommitmentId,
        current: CommitmentState,
        required: CommitmentState,
    },

    /// commitment {0} is already revoked
    AlreadyRevoked(CommitmentId),

    /// commitment {0} is not revoked
    NotRevoked(CommitmentId),

    /// commitment {0} does not supersede any prior commitment
    NoPriorCommitment(CommitmentId),

    /// commitment {0} is not the latest signed commitment of its owner
    StaleInput(CommitmentId),

    /// update of channel {channel} creates commitments #{found} while the
    /// next commitment number is #{expected}
    StaleUpdate {
        channel: ChannelId,
        expected: u64,
        found: u64,
    },

    /// {owner} already has signed commitments in channel {channel}, so the
    /// funding output can't be used as a commitment input
    FundingInputUsed { channel: ChannelId, owner: PeerId },

    /// commitment {0} is still waiting for the counterparty signature
    PendingCommitment(CommitmentId),

    /// {owner} has no signed commitment in channel {channel}
    NoSignedCommitment { channel: ChannelId, owner: PeerId },

    /// revocation secret of commitment {0} was not disclosed
    NoDisclosure(CommitmentId),

    /// revocation secret of commitment {0} is already acknowledged
    AlreadyAcknowledged(CommitmentId),
}

/// Failures of the external services. Retry policy is the caller
/// responsibility; a retry must not repeat a completed secret disclosure.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum ExternalError {
    #[from]
    Chain(ChainError),

    #[from]
    Store(StoreError),

    #[from]
    Session(SessionError),
}

/// Errors of the channel protocol operations
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// Malformed or mismatching data
    #[from]
    #[display(inner)]
    Validation(ValidationError),

    /// Operation is incompatible with the channel state
    #[from]
    #[display(inner)]
    State(StateError),

    /// temporary key {key} was already used in channel {channel}
    KeyReuse { key: PublicKey, channel: ChannelId },

    /// disclosed secret does not correspond to RSMC temporary key of
    /// commitment {commitment}
    SecretMismatch { commitment: CommitmentId },

    /// peer {0} is not authorized for the operation
    Unauthorized(PeerId),

    /// External service failure
    #[from]
    #[display(inner)]
    External(ExternalError),

    /// Channel terms are rejected by the node policy
    #[from]
    #[display(inner)]
    Policy(PolicyError),

    /// Message encoding error
    #[from]
    #[display(inner)]
    Codec(p2p::Error),

    /// Revocation secret encryption error
    #[from]
    #[display(inner)]
    Crypto(CryptoError),
}

impl From<ChainError> for Error {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Malformed { call, field } => {
                ValidationError::Malformed { call, field }.into()
            }
            err => ExternalError::Chain(err).into(),
        }
    }
}

impl From<StoreError> for Error {
    #[inline]
    fn from(err: StoreError) -> Self {
        ExternalError::Store(err).into()
    }
}

impl From<SessionError> for Error {
    #[inline]
    fn from(err: SessionError) -> Self {
        ExternalError::Session(err).into()
    }
}

impl Error {
    /// Detects errors signalling cryptographic integrity violations
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Error::KeyReuse { .. } | Error::SecretMismatch { .. })
    }
}
