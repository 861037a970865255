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

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Connectivity state of a user account
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize
)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[display("offline")]
    Offline,

    #[display("online")]
    Online,
}

/// User account record exchanged during login and logout. Account
/// credentials are managed outside of the channel protocol and are never
/// part of this message.
#[derive(Clone, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
#[display("user({peer_id}, {state})")]
pub struct User {
    /// Peer identity of the user
    pub peer_id: PeerId,

    /// Contact e-mail, if provided by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Current user state
    pub state: UserState,
}
