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

//! Hub-side core of two-party payment channels over Omni layer assets.
//!
//! Channels are opened, funded, updated with RSMC commitments and closed by
//! processing protocol messages of the channel peers in [`ChannelHub`].

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;

pub extern crate omnip2p as p2p;

pub mod balance;
pub mod chain;
pub mod channel;
pub mod commitment;
mod config;
mod error;
mod guard;
mod hub;
pub mod revocation;
pub mod session;
pub mod store;
#[cfg(test)]
mod test_utils;

pub use balance::{Balance, BalanceQueryService};
pub use chain::{ChainService, RpcChain, RpcTransport};
pub use channel::{ChannelInfo, ChannelRegistry, Lifecycle, Policy};
pub use commitment::{CommitmentEngine, CommitmentState, CommitmentTransaction};
pub use config::{
    Config, DEFAULT_DELIVERY_SEQUENCE, DEFAULT_MAX_COMMITMENT_FEE,
};
pub use error::{Error, ExternalError, StateError, ValidationError};
pub use guard::UpdateGuard;
pub use hub::{ChannelHub, PendingUpdate, UpdatePhase};
pub use revocation::RevocationManager;
pub use session::{KeyCustody, Presence, Session};
pub use store::{MemoryStore, PersistenceStore};
