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

// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code,
    //missing_docs
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[macro_use]
extern crate amplify;

use bitcoin::hashes::sha256;
use secp256k1::Message;

macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(
            secp256k1::SECP256K1,
            &secp256k1::ONE_KEY,
        )
    };
}

mod account;
mod balance;
mod channel;
mod commitment;
mod envelope;
mod types;

pub use account::{User, UserState};
pub use balance::{GetBalanceRequest, GetBalanceRespond};
pub use channel::{
    AcceptChannel, CloseChannel, FundingCreated, FundingSigned, OpenChannel,
};
pub use commitment::{CommitmentTx, CommitmentTxSigned, RevocationAck};
pub use envelope::{Envelope, Error, MessageType, Messages};
pub use types::{
    ActiveChannelId, ChannelId, CommitmentId, EncryptedSecret, PeerId,
    TempChannelId,
};

/// Property id of the base chain asset (bitcoin) in the Omni layer
pub const BTC_PROPERTY_ID: u32 = 0;

/// Property id of Tether (USDT) asset in the Omni layer
pub const USDT_PROPERTY_ID: u32 = 31;

/// Produces message digest which must be signed by a peer for a signed
/// payload. Tags separate digests of different message types.
pub(crate) fn tagged_message(tag: &str, body: String) -> Message {
    Message::from_hashed_data::<sha256::Hash>(
        format!("omnibolt:{}:{}", tag, body).as_bytes(),
    )
}
