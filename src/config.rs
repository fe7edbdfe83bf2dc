//! # Driver Configuration
//!
//! [`PhyConfig`] holds the tunables of the radio driver and the access
//! profile table. It is stored as JSON; missing fields take their defaults.
//!
//! ```json
//! {
//!   "rssi_settle_us": 1000,
//!   "max_packet_len": 255,
//!   "eirp_min": -39,
//!   "eirp_max": 10,
//!   "access_class": 1,
//!   "access_profiles": [
//!     {
//!       "channel_header": { "coding": "pn9", "class": "normal_rate", "freq_band": "868" },
//!       "subprofiles": [ { "subband_bitmap": 1, "scan_automation_period": 0 } ],
//!       "subbands": [ { "channel_index_start": 0, "channel_index_end": 0,
//!                       "eirp_limit": 10, "cca_threshold": -86, "duty_limit": 0 } ]
//!     }
//!   ]
//! }
//! ```

use crate::error::ConfigError;
use crate::phy::access_profile::{
    gateway_profiles, AccessClass, AccessProfile, AccessProfileTable, MAX_ACCESS_PROFILES,
    MAX_SUBBANDS, MAX_SUBPROFILES,
};
use crate::phy::packet::MAX_PACKET_LEN;
use crate::phy::radio::RadioSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    /// Time between arming RX and the first valid RSSI reading.
    pub rssi_settle_us: u64,
    pub max_packet_len: usize,
    /// Lowest transmit power in dBm.
    pub eirp_min: i8,
    /// Highest transmit power in dBm.
    pub eirp_max: i8,
    pub access_class: AccessClass,
    pub access_profiles: Vec<AccessProfile>,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            rssi_settle_us: 1_000,
            max_packet_len: MAX_PACKET_LEN,
            eirp_min: -39,
            eirp_max: 10,
            access_class: AccessClass::default(),
            access_profiles: gateway_profiles().profiles().to_vec(),
        }
    }
}

impl PhyConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PhyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!(
            "Loaded configuration from {} ({} access profiles)",
            path.display(),
            config.access_profiles.len()
        );
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_len == 0 || self.max_packet_len > MAX_PACKET_LEN {
            return Err(invalid(format!(
                "max_packet_len {} outside 1..={MAX_PACKET_LEN}",
                self.max_packet_len
            )));
        }
        if self.eirp_min > self.eirp_max {
            return Err(invalid(format!(
                "eirp_min {} above eirp_max {}",
                self.eirp_min, self.eirp_max
            )));
        }
        if self.access_profiles.is_empty() {
            return Err(invalid("access profile table is empty".into()));
        }
        if self.access_profiles.len() > MAX_ACCESS_PROFILES {
            return Err(invalid(format!(
                "{} access profiles, at most {MAX_ACCESS_PROFILES} are addressable",
                self.access_profiles.len()
            )));
        }
        for (index, profile) in self.access_profiles.iter().enumerate() {
            validate_profile(index, profile)?;
        }
        if self.access_class.profile_index() >= self.access_profiles.len() {
            return Err(invalid(format!(
                "access class 0x{:02X} selects missing profile {}",
                self.access_class.0,
                self.access_class.profile_index()
            )));
        }
        if self.access_class.subprofile_mask() == 0 {
            return Err(invalid(format!(
                "access class 0x{:02X} enables no sub-profile",
                self.access_class.0
            )));
        }
        Ok(())
    }

    pub fn profile_table(&self) -> AccessProfileTable {
        AccessProfileTable::new(self.access_profiles.clone())
    }

    /// Driver settings derived from this configuration.
    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            rssi_settle: Duration::from_micros(self.rssi_settle_us),
            max_packet_len: self.max_packet_len,
            eirp_range: (self.eirp_min, self.eirp_max),
            access_class: self.access_class,
            access_profiles: self.profile_table(),
        }
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

fn validate_profile(index: usize, profile: &AccessProfile) -> Result<(), ConfigError> {
    if profile.subprofiles.is_empty() || profile.subprofiles.len() > MAX_SUBPROFILES {
        return Err(invalid(format!(
            "profile {index}: {} sub-profiles, expected 1..={MAX_SUBPROFILES}",
            profile.subprofiles.len()
        )));
    }
    if profile.subbands.is_empty() || profile.subbands.len() > MAX_SUBBANDS {
        return Err(invalid(format!(
            "profile {index}: {} sub-bands, expected 1..={MAX_SUBBANDS}",
            profile.subbands.len()
        )));
    }
    for (sb_index, subband) in profile.subbands.iter().enumerate() {
        if subband.channel_index_start > subband.channel_index_end {
            return Err(invalid(format!(
                "profile {index}: sub-band {sb_index} has an inverted channel range {}..={}",
                subband.channel_index_start, subband.channel_index_end
            )));
        }
    }
    // bits above the last sub-band point nowhere
    let valid_bits = (1u16 << profile.subbands.len()) - 1;
    for (sp_index, subprofile) in profile.subprofiles.iter().enumerate() {
        if u16::from(subprofile.subband_bitmap) & !valid_bits != 0 {
            return Err(invalid(format!(
                "profile {index}: sub-profile {sp_index} bitmap 0x{:02X} selects missing sub-bands",
                subprofile.subband_bitmap
            )));
        }
    }
    Ok(())
}
