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


//! Per-channel exclusive slots for commitment updates

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use p2p::ChannelId;

use crate::error::StateError;

/// Holds state of at most one in-flight update per channel. Attempts to start
/// another update of a busy channel fail instead of waiting.
#[derive(Debug)]
pub struct UpdateGuard<T> {
    slots: Mutex<HashMap<ChannelId, T>>,
}

impl<T> Default for UpdateGuard<T> {
    fn default() -> Self {
        UpdateGuard {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> UpdateGuard<T> {
    pub fn new() -> Self {
        default!()
    }

    fn slots(&self) -> MutexGuard<HashMap<ChannelId, T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the update slot of the channel
    pub fn begin(
        &self,
        channel_id: ChannelId,
        update: T,
    ) -> Result<(), StateError> {
        let mut slots = self.slots();
        if slots.contains_key(&channel_id) {
            return Err(StateError::Busy(channel_id));
        }
        slots.insert(channel_id, update);
        Ok(())
    }

    #[inline]
    pub fn is_busy(&self, channel_id: ChannelId) -> bool {
        self.slots().contains_key(&channel_id)
    }

    /// Accesses in-flight update of the channel
    pub fn with_mut<R>(
        &self,
        channel_id: ChannelId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StateError> {
        self.slots()
            .get_mut(&channel_id)
            .map(f)
            .ok_or(StateError::NoUpdate(channel_id))
    }

    /// Runs `f` while no update of the channel can be started, failing if
    /// one is already in flight. `f` must not access the guard.
    pub fn exclusive<R>(
        &self,
        channel_id: ChannelId,
        f: impl FnOnce() -> R,
    ) -> Result<R, StateError> {
        let slots = self.slots();
        if slots.contains_key(&channel_id) {
            return Err(StateError::Busy(channel_id));
        }
        Ok(f())
    }

    /// Releases the update slot, returning the update state
    pub fn finish(&self, channel_id: ChannelId) -> Option<T> {
        self.slots().remove(&channel_id)
    }
}
