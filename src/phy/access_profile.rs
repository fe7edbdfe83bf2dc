//! # Access Profiles and Sub-Bands
//!
//! An access profile describes which channels a node may use and under which
//! power, duty-cycle and clear-channel limits. It consists of a channel header
//! (coding, class, band), up to four sub-profiles and up to eight sub-bands.
//! Each sub-profile selects sub-bands through a bitmap.
//!
//! The access class selects one profile of the table (upper nibble) and the
//! enabled sub-profiles within it (lower nibble).

use crate::phy::channel::{ChannelClass, ChannelHeader, ChannelId, Coding, FrequencyBand};
use serde::{Deserialize, Serialize};

/// Maximum number of sub-profiles in one access profile.
pub const MAX_SUBPROFILES: usize = 4;
/// Maximum number of sub-bands in one access profile.
pub const MAX_SUBBANDS: usize = 8;
/// Maximum number of access profiles addressable by an access class.
pub const MAX_ACCESS_PROFILES: usize = 15;

/// Legal operating envelope for a contiguous range of channel indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBand {
    pub channel_index_start: u8,
    pub channel_index_end: u8,
    /// Maximum EIRP in dBm.
    pub eirp_limit: i8,
    /// Clear channel assessment threshold in dBm.
    pub cca_threshold: i16,
    /// Duty cycle limit; 0 means unrestricted.
    pub duty_limit: u8,
}

impl SubBand {
    pub fn contains(&self, center_freq_index: u8) -> bool {
        (self.channel_index_start..=self.channel_index_end).contains(&center_freq_index)
    }
}

/// Selects a set of sub-bands plus a scan automation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubProfile {
    pub subband_bitmap: u8,
    pub scan_automation_period: u8,
}

impl SubProfile {
    pub fn selects(&self, subband: usize) -> bool {
        subband < MAX_SUBBANDS && self.subband_bitmap & (1 << subband) != 0
    }
}

/// Access class byte: profile specifier in bits 7..4, sub-profile mask in 3..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessClass(pub u8);

impl AccessClass {
    pub fn new(profile_index: u8, subprofile_mask: u8) -> Self {
        Self(((profile_index & 0x0F) << 4) | (subprofile_mask & 0x0F))
    }

    pub fn profile_index(self) -> usize {
        usize::from(self.0 >> 4)
    }

    pub fn subprofile_mask(self) -> u8 {
        self.0 & 0x0F
    }
}

impl Default for AccessClass {
    fn default() -> Self {
        // profile 0, first sub-profile
        AccessClass(0x01)
    }
}

/// Channel access rules for one access class specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessProfile {
    pub channel_header: ChannelHeader,
    pub subprofiles: Vec<SubProfile>,
    pub subbands: Vec<SubBand>,
}

impl AccessProfile {
    /// A profile with a single sub-profile selecting a single sub-band.
    pub fn single_subband(channel_header: ChannelHeader, subband: SubBand) -> Self {
        Self {
            channel_header,
            subprofiles: vec![SubProfile {
                subband_bitmap: 0x01,
                scan_automation_period: 0,
            }],
            subbands: vec![subband],
        }
    }

    /// Return the limits that apply to `channel` when the sub-profiles in
    /// `subprofile_mask` are enabled, or `None` if the channel is not permitted.
    pub fn limits_for(&self, channel: &ChannelId, subprofile_mask: u8) -> Option<&SubBand> {
        if channel.header != self.channel_header {
            return None;
        }

        let enabled_bitmap = self
            .subprofiles
            .iter()
            .take(MAX_SUBPROFILES)
            .enumerate()
            .filter(|(i, _)| subprofile_mask & (1 << i) != 0)
            .fold(0u8, |acc, (_, sp)| acc | sp.subband_bitmap);

        self.subbands
            .iter()
            .take(MAX_SUBBANDS)
            .enumerate()
            .find(|(i, sb)| enabled_bitmap & (1 << i) != 0 && sb.contains(channel.center_freq_index))
            .map(|(_, sb)| sb)
    }

    pub fn permits(&self, channel: &ChannelId, subprofile_mask: u8) -> bool {
        self.limits_for(channel, subprofile_mask).is_some()
    }

    /// First permitted channel of the enabled sub-profiles.
    pub fn first_channel(&self, subprofile_mask: u8) -> Option<ChannelId> {
        self.subbands.iter().take(MAX_SUBBANDS).find_map(|sb| {
            let channel = ChannelId {
                header: self.channel_header,
                center_freq_index: sb.channel_index_start,
            };
            self.permits(&channel, subprofile_mask).then_some(channel)
        })
    }
}

/// Loaded access profiles, indexed by the access class specifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessProfileTable {
    profiles: Vec<AccessProfile>,
}

impl AccessProfileTable {
    pub fn new(profiles: Vec<AccessProfile>) -> Self {
        Self { profiles }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AccessProfile> {
        self.profiles.get(index)
    }

    pub fn profiles(&self) -> &[AccessProfile] {
        &self.profiles
    }

    /// The profile selected by `access_class`.
    pub fn active(&self, access_class: AccessClass) -> Option<&AccessProfile> {
        self.profiles.get(access_class.profile_index())
    }

    /// Limits applying to `channel` under `access_class`.
    pub fn limits_for(&self, channel: &ChannelId, access_class: AccessClass) -> Option<&SubBand> {
        self.active(access_class)?
            .limits_for(channel, access_class.subprofile_mask())
    }

    pub fn permits(&self, channel: &ChannelId, access_class: AccessClass) -> bool {
        self.limits_for(channel, access_class).is_some()
    }
}

/// The profile table of the reference gateway: PN9 coding on the 868 and 433
/// bands in normal, high and low rate, each with one sub-band at index 0.
pub fn gateway_profiles() -> AccessProfileTable {
    let subband = SubBand {
        channel_index_start: 0,
        channel_index_end: 0,
        eirp_limit: 10,
        cca_threshold: -86,
        duty_limit: 0,
    };

    let mut profiles = Vec::with_capacity(6);
    for band in [FrequencyBand::Band868, FrequencyBand::Band433] {
        for class in [ChannelClass::NormalRate, ChannelClass::HiRate, ChannelClass::LoRate] {
            profiles.push(AccessProfile::single_subband(
                ChannelHeader::new(band, class, Coding::Pn9),
                subband,
            ));
        }
    }
    AccessProfileTable::new(profiles)
}
