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


//! Channel records, their lifecycle and establishment

mod funding;
mod info;
mod policy;
mod registry;

pub use funding::{
    FundingCoordinator, FundingEvidence, FundingTransaction,
};
pub use info::{ChannelInfo, CloseReason, Lifecycle, Side};
pub use policy::{
    CommonParams, PeerParams, Policy, PolicyError, DUST_LIMIT,
    MAX_ACCEPTED_HTLC_LIMIT,
};
pub use registry::{Acceptance, ChannelRegistry};
