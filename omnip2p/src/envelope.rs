// Omnibolt P2P library, implementing messaging of two-party payment channels
// over Omni layer assets
//
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

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    AcceptChannel, CloseChannel, CommitmentTx, CommitmentTxSigned,
    FundingCreated, FundingSigned, GetBalanceRequest, GetBalanceRespond,
    OpenChannel, PeerId, RevocationAck, User,
};

/// Errors of message encoding and decoding
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// unknown message type code {0}
    UnknownType(i32),

    /// malformed payload of `{message_type}` message: {details}
    Payload {
        message_type: MessageType,
        details: String,
    },

    /// malformed message envelope: {0}
    Envelope(String),
}

/// Message type codes. Negative values are used by the channel protocol;
/// positive by the account management.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[repr(i32)]
pub enum MessageType {
    #[display("user")]
    User = 1,

    #[display("open_channel")]
    OpenChannel = -32,

    #[display("accept_channel")]
    AcceptChannel = -33,

    #[display("funding_created")]
    FundingCreated = -34,

    #[display("funding_signed")]
    FundingSigned = -35,

    #[display("close_channel")]
    CloseChannel = -38,

    #[display("commitment_tx")]
    CommitmentTx = -351,

    #[display("commitment_tx_signed")]
    CommitmentTxSigned = -352,

    #[display("get_balance_request")]
    GetBalanceRequest = -353,

    #[display("get_balance_respond")]
    GetBalanceRespond = -354,

    #[display("revocation_ack")]
    RevocationAck = -355,
}

impl From<MessageType> for i32 {
    #[inline]
    fn from(message_type: MessageType) -> Self {
        message_type as i32
    }
}

impl TryFrom<i32> for MessageType {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => MessageType::User,
            -32 => MessageType::OpenChannel,
            -33 => MessageType::AcceptChannel,
            -34 => MessageType::FundingCreated,
            -35 => MessageType::FundingSigned,
            -38 => MessageType::CloseChannel,
            -351 => MessageType::CommitmentTx,
            -352 => MessageType::CommitmentTxSigned,
            -353 => MessageType::GetBalanceRequest,
            -354 => MessageType::GetBalanceRespond,
            -355 => MessageType::RevocationAck,
            unknown => return Err(Error::UnknownType(unknown)),
        })
    }
}

/// Wire envelope carrying a JSON-encoded message payload between peers
#[derive(
    Clone, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[display("envelope({message_type}, {sender} -> {recipient})")]
pub struct Envelope {
    /// Message type code
    #[serde(rename = "type")]
    pub message_type: i32,

    /// Sending peer
    pub sender: PeerId,

    /// Receiving peer
    pub recipient: PeerId,

    /// Type-specific JSON-encoded payload
    pub data: String,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self)
            .map_err(|err| Error::Envelope(err.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|err| Error::Envelope(err.to_string()))
    }

    /// Decodes the typed payload of the envelope
    #[inline]
    pub fn message(&self) -> Result<Messages, Error> {
        Messages::from_envelope(self)
    }
}

/// Messages of the payment channel protocol, one payload type per message
/// type code
#[derive(Clone, PartialEq, Eq, Debug, Display, From)]
#[display(inner)]
#[allow(clippy::large_enum_variant)]
pub enum Messages {
    // Part I: Account management
    // ==========================
    /// User login and logout information
    #[from]
    User(User),

    // Part II: Channel establishment
    // ==============================
    /// This message contains information about a funder and indicates its
    /// desire to set up a new channel.
    #[from]
    OpenChannel(OpenChannel),

    /// This message contains information about a fundee and indicates its
    /// acceptance of the new channel.
    #[from]
    AcceptChannel(AcceptChannel),

    /// This message announces the funding transaction created by the funder.
    #[from]
    FundingCreated(FundingCreated),

    /// This message gives the funder the fundee signature and introduces the
    /// permanent `channel_id`.
    #[from]
    FundingSigned(FundingSigned),

    // Part III: Channel operations
    // ============================
    /// Commitment update proposal or revocation secret disclosure
    #[from]
    CommitmentTx(CommitmentTx),

    /// Payee signature of the commitment update
    #[from]
    CommitmentTxSigned(CommitmentTxSigned),

    /// Acknowledgement of the revocation secret disclosure
    #[from]
    RevocationAck(RevocationAck),

    /// Signed balance query
    #[from]
    GetBalanceRequest(GetBalanceRequest),

    /// Balance query answer
    #[from]
    GetBalanceRespond(GetBalanceRespond),

    // Part IV: Channel closing
    // ========================
    /// Cooperative channel close request and its confirmation
    #[from]
    CloseChannel(CloseChannel),
}

impl Messages {
    /// Returns type code of the message
    pub fn message_type(&self) -> MessageType {
        match self {
            Messages::User(_) => MessageType::User,
            Messages::OpenChannel(_) => MessageType::OpenChannel,
            Messages::AcceptChannel(_) => MessageType::AcceptChannel,
            Messages::FundingCreated(_) => MessageType::FundingCreated,
            Messages::FundingSigned(_) => MessageType::FundingSigned,
            Messages::CommitmentTx(_) => MessageType::CommitmentTx,
            Messages::CommitmentTxSigned(_) => MessageType::CommitmentTxSigned,
            Messages::RevocationAck(_) => MessageType::RevocationAck,
            Messages::GetBalanceRequest(_) => MessageType::GetBalanceRequest,
            Messages::GetBalanceRespond(_) => MessageType::GetBalanceRespond,
            Messages::CloseChannel(_) => MessageType::CloseChannel,
        }
    }

    /// Packs the message into an envelope
    pub fn to_envelope(
        &self,
        sender: PeerId,
        recipient: PeerId,
    ) -> Result<Envelope, Error> {
        let data = match self {
            Messages::User(msg) => serde_json::to_string(msg),
            Messages::OpenChannel(msg) => serde_json::to_string(msg),
            Messages::AcceptChannel(msg) => serde_json::to_string(msg),
            Messages::FundingCreated(msg) => serde_json::to_string(msg),
            Messages::FundingSigned(msg) => serde_json::to_string(msg),
            Messages::CommitmentTx(msg) => serde_json::to_string(msg),
            Messages::CommitmentTxSigned(msg) => serde_json::to_string(msg),
            Messages::RevocationAck(msg) => serde_json::to_string(msg),
            Messages::GetBalanceRequest(msg) => serde_json::to_string(msg),
            Messages::GetBalanceRespond(msg) => serde_json::to_string(msg),
            Messages::CloseChannel(msg) => serde_json::to_string(msg),
        }
        .map_err(|err| Error::Payload {
            message_type: self.message_type(),
            details: err.to_string(),
        })?;
        Ok(Envelope {
            message_type: self.message_type().into(),
            sender,
            recipient,
            data,
        })
    }

    /// Unpacks the message from an envelope, dispatching on the message type
    /// code
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, Error> {
        let message_type = MessageType::try_from(envelope.message_type)?;
        let data = envelope.data.as_str();
        Ok(match message_type {
            MessageType::User => Messages::User(decode(message_type, data)?),
            MessageType::OpenChannel => {
                Messages::OpenChannel(decode(message_type, data)?)
            }
            MessageType::AcceptChannel => {
                Messages::AcceptChannel(decode(message_type, data)?)
            }
            MessageType::FundingCreated => {
                Messages::FundingCreated(decode(message_type, data)?)
            }
            MessageType::FundingSigned => {
                Messages::FundingSigned(decode(message_type, data)?)
            }
            MessageType::CommitmentTx => {
                Messages::CommitmentTx(decode(message_type, data)?)
            }
            MessageType::CommitmentTxSigned => {
                Messages::CommitmentTxSigned(decode(message_type, data)?)
            }
            MessageType::RevocationAck => {
                Messages::RevocationAck(decode(message_type, data)?)
            }
            MessageType::GetBalanceRequest => {
                Messages::GetBalanceRequest(decode(message_type, data)?)
            }
            MessageType::GetBalanceRespond => {
                Messages::GetBalanceRespond(decode(message_type, data)?)
            }
            MessageType::CloseChannel => {
                Messages::CloseChannel(decode(message_type, data)?)
            }
        })
    }
}

fn decode<T>(message_type: MessageType, data: &str) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_str(data).map_err(|err| Error::Payload {
        message_type,
        details: err.to_string(),
    })
}
