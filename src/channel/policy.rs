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

use std::ops::Range;

use p2p::{AcceptChannel, OpenChannel};
use serde::{Deserialize, Serialize};

/// Limit for the maximum number of the accepted HTLCs towards some node
pub const MAX_ACCEPTED_HTLC_LIMIT: u16 = 483;

/// Minimal dust limit
pub const DUST_LIMIT: u64 = 354;

/// Channel terms from `open_channel` and `accept_channel` messages rejected
/// by the hub policy
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum PolicyError {
    /// revocable delivery delay of {proposed} blocks exceeds the policy limit
    /// of {allowed_maximum} blocks
    ToSelfDelayUnreasonablyLarge { proposed: u16, allowed_maximum: u16 },

    /// proposed limit of {0} accepted HTLCs is above protocol maximum of 483
    MaxAcceptedHtlcLimitExceeded(u16),

    /// fee rate {proposed} sat/kw is outside of the accepted range
    /// {lowest_accepted}..{highest_accepted} sat/kw
    FeeRateUnreasonable {
        proposed: u32,
        lowest_accepted: u32,
        highest_accepted: u32,
    },

    /// channel reserve {reserve} is below the dust limit {dust_limit}
    ChannelReserveLessDust { reserve: u64, dust_limit: u64 },

    /// dust limit {0} sat is less than protocol minimum requirement of 354
    /// sat; rejecting the channel
    DustLimitTooSmall(u64),

    /// channel funding of {proposed} is below the policy minimum of
    /// {required_minimum}
    ChannelFundingTooSmall {
        proposed: u64,
        required_minimum: u64,
    },

    /// HTLC minimum {proposed} exceeds the policy limit of {allowed_maximum}
    HtlcMinimumTooLarge { proposed: u64, allowed_maximum: u64 },

    /// in-flight HTLC value limit of {proposed} is below the policy minimum of
    /// {required_minimum}
    HtlcInFlightMaximumTooSmall {
        proposed: u64,
        required_minimum: u64,
    },

    /// channel reserve {proposed} exceeds the policy limit of
    /// {allowed_maximum}
    ChannelReserveTooLarge { proposed: u64, allowed_maximum: u64 },

    /// limit of {proposed} accepted HTLCs is below the policy minimum of
    /// {required_minimum}
    MaxAcceptedHtlcsTooSmall {
        proposed: u16,
        required_minimum: u16,
    },

    /// dust limit {proposed} sats exceeds node policy requirement of
    /// {allowed_maximum}; rejecting the channel
    DustLimitTooLarge { proposed: u64, allowed_maximum: u64 },

    /// funding depth of {proposed} blocks requested by the fundee exceeds the
    /// policy limit of {allowed_maximum} blocks
    UnreasonableMinDepth { proposed: u32, allowed_maximum: u32 },

    /// fundee channel reserve {channel_reserve} is below the funder dust
    /// limit {dust_limit}
    LocalDustExceedsRemoteReserve {
        channel_reserve: u64,
        dust_limit: u64,
    },

    /// `channel_reserve_satoshis` from the open_channel message
    /// ({channel_reserve}) is less than `dust_limit_satoshis`
    /// ({dust_limit}); rejecting the channel
    RemoteDustExceedsLocalReserve {
        channel_reserve: u64,
        dust_limit: u64,
    },
}

/// Limits applied by the hub to the channel terms proposed by the funder in
/// `open_channel` and confirmed by the fundee in `accept_channel`.
///
/// Amounts are measured in the units of the channel asset.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Largest revocable delivery delay a peer may require, in blocks
    pub to_self_delay_max: u16,

    /// Accepted commitment fee rates
    pub feerate_per_kw_range: Range<u32>,

    /// Funding depth required before the channel is considered funded
    pub minimum_depth: u32,

    /// Largest funding depth the fundee may require
    pub maximum_depth: Option<u32>,

    /// Smallest channel funding
    pub funding_satoshis_min: Option<u64>,

    /// Largest acceptable HTLC minimum
    pub htlc_minimum_msat_max: Option<u64>,

    /// Smallest acceptable in-flight HTLC value limit
    pub max_htlc_value_in_flight_msat_min: Option<u64>,

    /// Largest channel reserve in absolute value
    pub channel_reserve_satoshis_max_abs: Option<u64>,

    /// Largest channel reserve in percents of the channel funding
    pub channel_reserve_satoshis_max_percent: Option<u8>,

    /// Smallest acceptable limit of accepted HTLCs
    pub max_accepted_htlcs_min: Option<u16>,

    /// Largest dust limit
    pub dust_limit_satoshis_max: Option<u64>,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            to_self_delay_max: 2016,
            feerate_per_kw_range: 1..1000,
            minimum_depth: 3,
            maximum_depth: Some(6),
            funding_satoshis_min: Some(10000),
            htlc_minimum_msat_max: None,
            max_htlc_value_in_flight_msat_min: Some(10000),
            max_accepted_htlcs_min: Some(10),
            channel_reserve_satoshis_max_abs: None,
            // reserve must not lock more than a tenth of the channel funds
            channel_reserve_satoshis_max_percent: Some(10),
            dust_limit_satoshis_max: Some(1000),
        }
    }
}

impl Policy {
    fn validate_peer_params(
        &self,
        params: PeerParams,
    ) -> Result<(), PolicyError> {
        if params.to_self_delay > self.to_self_delay_max {
            return Err(PolicyError::ToSelfDelayUnreasonablyLarge {
                proposed: params.to_self_delay,
                allowed_maximum: self.to_self_delay_max,
            });
        }
        if params.max_accepted_htlcs > MAX_ACCEPTED_HTLC_LIMIT {
            return Err(PolicyError::MaxAcceptedHtlcLimitExceeded(
                params.max_accepted_htlcs,
            ));
        }
        if params.dust_limit_satoshis > params.channel_reserve_satoshis {
            return Err(PolicyError::ChannelReserveLessDust {
                reserve: params.channel_reserve_satoshis,
                dust_limit: params.dust_limit_satoshis,
            });
        }
        if params.dust_limit_satoshis < DUST_LIMIT {
            return Err(PolicyError::DustLimitTooSmall(
                params.dust_limit_satoshis,
            ));
        }

        match self {
            Policy {
                htlc_minimum_msat_max: Some(limit),
                ..
            } if params.htlc_minimum_msat > *limit => {
                Err(PolicyError::HtlcMinimumTooLarge {
                    proposed: params.htlc_minimum_msat,
                    allowed_maximum: *limit,
                })
            }
            Policy {
                max_htlc_value_in_flight_msat_min: Some(limit),
                ..
            } if params.max_htlc_value_in_flight_msat < *limit => {
                Err(PolicyError::HtlcInFlightMaximumTooSmall {
                    proposed: params.max_htlc_value_in_flight_msat,
                    required_minimum: *limit,
                })
            }
            Policy {
                channel_reserve_satoshis_max_abs: Some(limit),
                ..
            } if params.channel_reserve_satoshis > *limit => {
                Err(PolicyError::ChannelReserveTooLarge {
                    proposed: params.channel_reserve_satoshis,
                    allowed_maximum: *limit,
                })
            }
            Policy {
                max_accepted_htlcs_min: Some(limit),
                ..
            } if params.max_accepted_htlcs < *limit => {
                Err(PolicyError::MaxAcceptedHtlcsTooSmall {
                    proposed: params.max_accepted_htlcs,
                    required_minimum: *limit,
                })
            }
            Policy {
                dust_limit_satoshis_max: Some(limit),
                ..
            } if params.dust_limit_satoshis > *limit => {
                Err(PolicyError::DustLimitTooLarge {
                    proposed: params.dust_limit_satoshis,
                    allowed_maximum: *limit,
                })
            }
            _ => Ok(()),
        }
    }

    /// Validates channel terms proposed by the funder.
    ///
    /// # Returns
    /// Funder [`PeerParams`], which bind the transactions owned by the fundee.
    pub fn validate_inbound(
        &self,
        open_channel: &OpenChannel,
    ) -> Result<PeerParams, PolicyError> {
        if !self
            .feerate_per_kw_range
            .contains(&open_channel.feerate_per_kw)
        {
            return Err(PolicyError::FeeRateUnreasonable {
                proposed: open_channel.feerate_per_kw,
                lowest_accepted: self.feerate_per_kw_range.start,
                highest_accepted: self.feerate_per_kw_range.end,
            });
        }

        if let Some(limit) = self.funding_satoshis_min {
            if open_channel.funding_satoshis < limit {
                return Err(PolicyError::ChannelFundingTooSmall {
                    proposed: open_channel.funding_satoshis,
                    required_minimum: limit,
                });
            }
        }

        if let Some(percents) = self.channel_reserve_satoshis_max_percent {
            let limit = open_channel.funding_satoshis * percents as u64 / 100;
            if open_channel.channel_reserve_satoshis > limit {
                return Err(PolicyError::ChannelReserveTooLarge {
                    proposed: open_channel.channel_reserve_satoshis,
                    allowed_maximum: limit,
                });
            }
        }

        let peer_params = PeerParams::from(open_channel);
        self.validate_peer_params(peer_params)?;
        Ok(peer_params)
    }

    /// Confirms that the terms of the fundee are compatible with the terms
    /// already accepted from the funder (`funder_params`).
    ///
    /// # Returns
    /// Fundee [`PeerParams`], which bind the transactions owned by the funder.
    pub fn confirm_outbound(
        &self,
        funder_params: PeerParams,
        accept_channel: &AcceptChannel,
    ) -> Result<PeerParams, PolicyError> {
        if let Some(limit) = self.maximum_depth {
            if accept_channel.minimum_depth > limit {
                return Err(PolicyError::UnreasonableMinDepth {
                    proposed: accept_channel.minimum_depth,
                    allowed_maximum: limit,
                });
            }
        }

        if accept_channel.channel_reserve_satoshis
            < funder_params.dust_limit_satoshis
        {
            return Err(PolicyError::LocalDustExceedsRemoteReserve {
                channel_reserve: accept_channel.channel_reserve_satoshis,
                dust_limit: funder_params.dust_limit_satoshis,
            });
        }
        if funder_params.channel_reserve_satoshis
            < accept_channel.dust_limit_satoshis
        {
            return Err(PolicyError::RemoteDustExceedsLocalReserve {
                channel_reserve: funder_params.channel_reserve_satoshis,
                dust_limit: accept_channel.dust_limit_satoshis,
            });
        }

        let peer_params = PeerParams::from(accept_channel);
        self.validate_peer_params(peer_params)?;
        Ok(peer_params)
    }
}

/// Channel terms shared by both peers
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Hash, Default, Serialize, Deserialize
)]
pub struct CommonParams {
    /// Funding depth agreed by the peers
    pub minimum_depth: u32,

    /// Commitment fee rate proposed by the funder
    pub feerate_per_kw: u32,

    /// Omni property id of the channel asset
    pub property_id: u32,
}

impl CommonParams {
    /// Extracts common terms from `open_channel` using the hub requirement
    /// for the funding depth
    #[inline]
    pub fn with(open_channel: &OpenChannel, minimum_depth: u32) -> Self {
        CommonParams {
            minimum_depth,
            feerate_per_kw: open_channel.feerate_per_kw,
            property_id: open_channel.property_id,
        }
    }
}

/// Channel terms requested by one of the peers. They constrain the
/// transactions which are signed by the other peer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct PeerParams {
    /// Outputs below this threshold are omitted
    pub dust_limit_satoshis: u64,

    /// Relative lock of the counterparty revocable delivery transaction
    pub to_self_delay: u16,

    /// Smallest accepted HTLC
    pub htlc_minimum_msat: u64,

    /// Upper limit of HTLC value in flight
    pub max_htlc_value_in_flight_msat: u64,

    /// Funds the counterparty must keep unencumbered
    pub channel_reserve_satoshis: u64,

    /// Upper limit of accepted HTLCs
    pub max_accepted_htlcs: u16,
}

impl Default for PeerParams {
    fn default() -> Self {
        PeerParams {
            dust_limit_satoshis: DUST_LIMIT,
            to_self_delay: 3,
            htlc_minimum_msat: 1,
            max_htlc_value_in_flight_msat: 1_000_000_000,
            channel_reserve_satoshis: 10000,
            max_accepted_htlcs: MAX_ACCEPTED_HTLC_LIMIT,
        }
    }
}

impl From<&OpenChannel> for PeerParams {
    #[inline]
    fn from(open_channel: &OpenChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: open_channel.dust_limit_satoshis,
            to_self_delay: open_channel.to_self_delay,
            htlc_minimum_msat: open_channel.htlc_minimum_msat,
            max_htlc_value_in_flight_msat: open_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: open_channel.channel_reserve_satoshis,
            max_accepted_htlcs: open_channel.max_accepted_htlcs,
        }
    }
}

impl From<&AcceptChannel> for PeerParams {
    #[inline]
    fn from(accept_channel: &AcceptChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: accept_channel.dust_limit_satoshis,
            to_self_delay: accept_channel.to_self_delay,
            htlc_minimum_msat: accept_channel.htlc_minimum_msat,
            max_htlc_value_in_flight_msat: accept_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: accept_channel.channel_reserve_satoshis,
            max_accepted_htlcs: accept_channel.max_accepted_htlcs,
        }
    }
}
