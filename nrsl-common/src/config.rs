//! Configuration records for a sidelink UE
//!
//! `SlUeConfig` carries everything the MAC consumes at construction: the
//! carrier numerology and bandwidth, the MAC scheduling knobs and the
//! preconfigured resource pool. All records deserialize from YAML with
//! per-field defaults, so a file only needs to list what it overrides.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::slot::{slots_per_subframe, MAX_NUMEROLOGY};

/// Upper bound of HARQ processes; the SCI-2A HARQ id field is 4 bits.
pub const MAX_SIDELINK_PROCESSES: u8 = 16;

/// Upper bound of `sl_max_tx_trans_num_pssch`.
pub const MAX_TX_TRANS_NUM_PSSCH: u8 = 32;

/// Reservation periods (ms) a preconfigured pool allows by default.
pub const DEFAULT_RESERVATION_PERIODS_MS: [u16; 16] = [
    0, 10, 20, 50, 100, 150, 200, 250, 300, 350, 400, 500, 550, 600, 750, 1000,
];

/// Sidelink bitmap of the default preconfigured pool.
pub const DEFAULT_SL_BITMAP: [u8; 10] = [1, 1, 1, 1, 1, 1, 0, 0, 0, 1];

/// Slot direction in the TDD pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TddSlotType {
    /// Downlink slot
    #[serde(alias = "DL")]
    Dl,
    /// Uplink slot, the only kind usable for sidelink
    #[serde(alias = "UL")]
    Ul,
    /// Flexible slot
    #[serde(alias = "F")]
    Flexible,
}

impl fmt::Display for TddSlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TddSlotType::Dl => write!(f, "DL"),
            TddSlotType::Ul => write!(f, "UL"),
            TddSlotType::Flexible => write!(f, "F"),
        }
    }
}

/// MAC scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlMacConfig {
    /// Filter candidates with sensed reservations
    #[serde(default)]
    pub enable_sensing: bool,
    /// Processing time of sensing results, in slots
    #[serde(default = "default_tproc0")]
    pub tproc0: u8,
    /// Start of the selection window, in slots from now
    #[serde(default = "default_t1")]
    pub t1: u8,
    /// End of the selection window, in slots from now
    #[serde(default = "default_t2")]
    pub t2: u16,
    /// Pool used for transmission
    #[serde(default)]
    pub active_pool_id: u16,
    /// Resource reservation period in ms
    #[serde(default = "default_reservation_period_ms")]
    pub reservation_period_ms: u16,
    /// Number of HARQ processes
    #[serde(default = "default_num_sidelink_process")]
    pub num_sidelink_process: u8,
    /// Blind retransmissions of every TB
    #[serde(default = "default_true")]
    pub enable_blind_retx: bool,
    /// Initial RSRP exclusion threshold in dBm
    #[serde(default = "default_thres_pssch_rsrp")]
    pub sl_thres_pssch_rsrp: i32,
    /// Minimum share of candidates that must survive exclusion, in percent
    #[serde(default = "default_resource_percentage")]
    pub resource_percentage: u8,
    /// Probability of keeping the reservation when the counter expires
    #[serde(default)]
    pub sl_prob_resource_keep: f64,
    /// Maximum transmissions of one TB, including the first
    #[serde(default = "default_max_tx_trans_num_pssch")]
    pub sl_max_tx_trans_num_pssch: u8,
    /// Fixed MCS used by the built-in allocator
    #[serde(default = "default_mcs")]
    pub mcs: u8,
    /// Source layer-2 id of this UE
    #[serde(default = "default_src_l2_id")]
    pub src_l2_id: u32,
    /// Seed for reproducible runs; entropy when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_tproc0() -> u8 {
    1
}

fn default_t1() -> u8 {
    2
}

fn default_t2() -> u16 {
    33
}

fn default_reservation_period_ms() -> u16 {
    100
}

fn default_num_sidelink_process() -> u8 {
    4
}

fn default_true() -> bool {
    true
}

fn default_thres_pssch_rsrp() -> i32 {
    -128
}

fn default_resource_percentage() -> u8 {
    20
}

fn default_max_tx_trans_num_pssch() -> u8 {
    5
}

fn default_mcs() -> u8 {
    14
}

fn default_src_l2_id() -> u32 {
    1
}

impl Default for SlMacConfig {
    fn default() -> Self {
        Self {
            enable_sensing: false,
            tproc0: default_tproc0(),
            t1: default_t1(),
            t2: default_t2(),
            active_pool_id: 0,
            reservation_period_ms: default_reservation_period_ms(),
            num_sidelink_process: default_num_sidelink_process(),
            enable_blind_retx: true,
            sl_thres_pssch_rsrp: default_thres_pssch_rsrp(),
            resource_percentage: default_resource_percentage(),
            sl_prob_resource_keep: 0.0,
            sl_max_tx_trans_num_pssch: default_max_tx_trans_num_pssch(),
            mcs: default_mcs(),
            src_l2_id: default_src_l2_id(),
            rng_seed: None,
        }
    }
}

/// Highest MCS index of the 64QAM table.
pub const MAX_MCS: u8 = 28;

/// Preconfigured sidelink resource pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlPoolConfig {
    /// Pool identifier
    #[serde(default)]
    pub pool_id: u16,
    /// Sub-channel size in RBs
    #[serde(default = "default_sub_channel_size_rbs")]
    pub sub_channel_size_rbs: u16,
    /// First PSCCH symbol
    #[serde(default)]
    pub pscch_sym_start: u8,
    /// Number of PSCCH symbols
    #[serde(default = "default_pscch_sym_length")]
    pub pscch_sym_length: u8,
    /// PSCCH bandwidth in RBs
    #[serde(default = "default_pscch_rbs")]
    pub pscch_rbs: u16,
    /// First PSSCH symbol
    #[serde(default = "default_pssch_sym_start")]
    pub pssch_sym_start: u8,
    /// Number of PSSCH symbols
    #[serde(default = "default_pssch_sym_length")]
    pub pssch_sym_length: u8,
    /// Maximum reserved occasions signalled in one SCI-1A (1-3)
    #[serde(default = "default_max_num_per_reserve")]
    pub max_num_per_reserve: u8,
    /// Sensing window length in ms
    #[serde(default = "default_sensing_window_ms")]
    pub sensing_window_ms: u16,
    /// Sidelink bitmap applied over the UL slots of the TDD pattern
    #[serde(default = "default_sl_bitmap")]
    pub sl_bitmap: Vec<u8>,
    /// TDD pattern repeated over time
    #[serde(default = "default_tdd_pattern")]
    pub tdd_pattern: Vec<TddSlotType>,
    /// Reservation periods allowed in this pool, in ms
    #[serde(default = "default_reservation_periods_ms")]
    pub reservation_periods_ms: Vec<u16>,
}

fn default_sub_channel_size_rbs() -> u16 {
    50
}

fn default_pscch_sym_length() -> u8 {
    1
}

fn default_pscch_rbs() -> u16 {
    10
}

fn default_pssch_sym_start() -> u8 {
    1
}

fn default_pssch_sym_length() -> u8 {
    12
}

fn default_max_num_per_reserve() -> u8 {
    2
}

fn default_sensing_window_ms() -> u16 {
    100
}

fn default_sl_bitmap() -> Vec<u8> {
    DEFAULT_SL_BITMAP.to_vec()
}

fn default_tdd_pattern() -> Vec<TddSlotType> {
    vec![TddSlotType::Ul; 10]
}

fn default_reservation_periods_ms() -> Vec<u16> {
    DEFAULT_RESERVATION_PERIODS_MS.to_vec()
}

impl Default for SlPoolConfig {
    fn default() -> Self {
        Self {
            pool_id: 0,
            sub_channel_size_rbs: default_sub_channel_size_rbs(),
            pscch_sym_start: 0,
            pscch_sym_length: default_pscch_sym_length(),
            pscch_rbs: default_pscch_rbs(),
            pssch_sym_start: default_pssch_sym_start(),
            pssch_sym_length: default_pssch_sym_length(),
            max_num_per_reserve: default_max_num_per_reserve(),
            sensing_window_ms: default_sensing_window_ms(),
            sl_bitmap: default_sl_bitmap(),
            tdd_pattern: default_tdd_pattern(),
            reservation_periods_ms: default_reservation_periods_ms(),
        }
    }
}

/// Complete configuration of one sidelink UE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlUeConfig {
    /// Carrier numerology (mu)
    #[serde(default)]
    pub numerology: u8,
    /// Sidelink bandwidth in RBs
    #[serde(default = "default_bandwidth_rbs")]
    pub bandwidth_rbs: u16,
    /// MAC scheduling parameters
    #[serde(default)]
    pub mac: SlMacConfig,
    /// Preconfigured resource pool
    #[serde(default)]
    pub pool: SlPoolConfig,
}

fn default_bandwidth_rbs() -> u16 {
    100
}

impl Default for SlUeConfig {
    fn default() -> Self {
        Self {
            numerology: 0,
            bandwidth_rbs: default_bandwidth_rbs(),
            mac: SlMacConfig::default(),
            pool: SlPoolConfig::default(),
        }
    }
}

/// Returns whether `ms` is a reservation period a UE may transmit with:
/// 1-99 ms, or a multiple of 50 ms between 100 and 1000 ms.
pub fn is_valid_reservation_period(ms: u16) -> bool {
    (1..100).contains(&ms) || ((100..=1000).contains(&ms) && ms % 50 == 0)
}

impl SlUeConfig {
    /// Parses a configuration from a YAML string. Does not validate.
    ///
    /// # Example
    /// ```
    /// use nrsl_common::SlUeConfig;
    ///
    /// let yaml = r#"
    /// numerology: 1
    /// mac:
    ///   enable_sensing: true
    ///   t2: 60
    /// "#;
    ///
    /// let config = SlUeConfig::from_yaml_str(yaml).unwrap();
    /// assert_eq!(config.numerology, 1);
    /// assert_eq!(config.mac.t1, 2);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads and validates a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Number of sub-channels across the sidelink bandwidth.
    pub fn total_sub_channels(&self) -> u16 {
        if self.pool.sub_channel_size_rbs == 0 {
            return 0;
        }
        self.bandwidth_rbs / self.pool.sub_channel_size_rbs
    }

    /// Selection window length (T2 - T1 + 1 slots) in microseconds.
    pub fn selection_window_us(&self) -> u64 {
        let slots = u64::from(self.mac.t2).saturating_sub(u64::from(self.mac.t1)) + 1;
        slots * 1000 / slots_per_subframe(self.numerology)
    }

    /// Checks every parameter range and cross-field constraint.
    pub fn validate(&self) -> Result<()> {
        let mac = &self.mac;
        let pool = &self.pool;

        if self.numerology > MAX_NUMEROLOGY {
            return Err(Error::Config(format!(
                "numerology {} exceeds {}",
                self.numerology, MAX_NUMEROLOGY
            )));
        }

        if mac.t1 == 0 || u16::from(mac.t1) > mac.t2 {
            return Err(Error::Config(format!(
                "selection window T1={} T2={} must satisfy 1 <= T1 <= T2",
                mac.t1, mac.t2
            )));
        }

        if !is_valid_reservation_period(mac.reservation_period_ms) {
            return Err(Error::Config(format!(
                "reservation period {} ms must be 1-99 ms or a multiple of 50 ms in 100-1000 ms",
                mac.reservation_period_ms
            )));
        }

        if !pool.reservation_periods_ms.is_empty()
            && !pool
                .reservation_periods_ms
                .contains(&mac.reservation_period_ms)
        {
            return Err(Error::Config(format!(
                "reservation period {} ms not allowed in pool {}",
                mac.reservation_period_ms, pool.pool_id
            )));
        }

        if self.selection_window_us() > u64::from(mac.reservation_period_ms) * 1000 {
            return Err(Error::Config(format!(
                "selection window of {} us is longer than the reservation period of {} ms",
                self.selection_window_us(),
                mac.reservation_period_ms
            )));
        }

        if mac.num_sidelink_process == 0 || mac.num_sidelink_process > MAX_SIDELINK_PROCESSES {
            return Err(Error::Config(format!(
                "num_sidelink_process {} must be 1-{}",
                mac.num_sidelink_process, MAX_SIDELINK_PROCESSES
            )));
        }

        if mac.sl_thres_pssch_rsrp > 0 {
            return Err(Error::Config(format!(
                "sl_thres_pssch_rsrp {} dBm must not be positive",
                mac.sl_thres_pssch_rsrp
            )));
        }

        if !(1..=100).contains(&mac.resource_percentage) {
            return Err(Error::Config(format!(
                "resource_percentage {} must be 1-100",
                mac.resource_percentage
            )));
        }

        if !(0.0..=1.0).contains(&mac.sl_prob_resource_keep) {
            return Err(Error::Config(format!(
                "sl_prob_resource_keep {} must be within [0, 1]",
                mac.sl_prob_resource_keep
            )));
        }

        if mac.sl_max_tx_trans_num_pssch == 0 || mac.sl_max_tx_trans_num_pssch > MAX_TX_TRANS_NUM_PSSCH
        {
            return Err(Error::Config(format!(
                "sl_max_tx_trans_num_pssch {} must be 1-{}",
                mac.sl_max_tx_trans_num_pssch, MAX_TX_TRANS_NUM_PSSCH
            )));
        }

        if mac.mcs > MAX_MCS {
            return Err(Error::Config(format!("mcs {} exceeds {}", mac.mcs, MAX_MCS)));
        }

        if mac.active_pool_id != pool.pool_id {
            return Err(Error::Config(format!(
                "active pool {} is not configured (pool id {})",
                mac.active_pool_id, pool.pool_id
            )));
        }

        self.validate_pool()
    }

    fn validate_pool(&self) -> Result<()> {
        let pool = &self.pool;

        if pool.sub_channel_size_rbs == 0 || pool.sub_channel_size_rbs > self.bandwidth_rbs {
            return Err(Error::Config(format!(
                "sub-channel size {} RBs must be 1-{} RBs",
                pool.sub_channel_size_rbs, self.bandwidth_rbs
            )));
        }

        // start and total sub-channel fields of SCI-1A
        if self.total_sub_channels() > u16::from(u8::MAX) {
            return Err(Error::Config(format!(
                "{} sub-channels exceed the SCI-1A range",
                self.total_sub_channels()
            )));
        }

        if pool.pscch_rbs == 0 || pool.pscch_rbs > pool.sub_channel_size_rbs {
            return Err(Error::Config(format!(
                "PSCCH of {} RBs must fit in one sub-channel of {} RBs",
                pool.pscch_rbs, pool.sub_channel_size_rbs
            )));
        }

        if !(1..=3).contains(&pool.max_num_per_reserve) {
            return Err(Error::Config(format!(
                "max_num_per_reserve {} must be 1, 2 or 3",
                pool.max_num_per_reserve
            )));
        }

        if pool.sensing_window_ms == 0 {
            return Err(Error::Config("sensing window must not be empty".to_string()));
        }

        if pool.sl_bitmap.is_empty() {
            return Err(Error::Config("sidelink bitmap must not be empty".to_string()));
        }

        if pool.sl_bitmap.iter().any(|&bit| bit > 1) {
            return Err(Error::Config(
                "sidelink bitmap entries must be 0 or 1".to_string(),
            ));
        }

        if pool.tdd_pattern.is_empty() {
            return Err(Error::Config("TDD pattern must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SlUeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mac.tproc0, 1);
        assert_eq!(config.mac.t1, 2);
        assert_eq!(config.mac.t2, 33);
        assert_eq!(config.mac.reservation_period_ms, 100);
        assert_eq!(config.mac.num_sidelink_process, 4);
        assert!(config.mac.enable_blind_retx);
        assert!(!config.mac.enable_sensing);
        assert_eq!(config.mac.sl_thres_pssch_rsrp, -128);
        assert_eq!(config.mac.resource_percentage, 20);
        assert_eq!(config.pool.sl_bitmap.len(), 10);
        assert_eq!(config.total_sub_channels(), 2);
    }

    #[test]
    fn test_reservation_period_values() {
        assert!(is_valid_reservation_period(1));
        assert!(is_valid_reservation_period(99));
        assert!(is_valid_reservation_period(100));
        assert!(is_valid_reservation_period(650));
        assert!(is_valid_reservation_period(1000));
        assert!(!is_valid_reservation_period(0));
        assert!(!is_valid_reservation_period(120));
        assert!(!is_valid_reservation_period(1050));
    }

    #[test]
    fn test_selection_window_fits_period() {
        let config = SlUeConfig::default();
        // 32 slots of 1 ms against 100 ms
        assert_eq!(config.selection_window_us(), 32_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_t2_rejected() {
        let mut config = SlUeConfig::default();
        config.mac.t2 = 200;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("selection window"));
    }

    #[test]
    fn test_t2_allowed_at_higher_numerology() {
        let mut config = SlUeConfig::default();
        config.numerology = 1;
        config.mac.t2 = 190; // 189 slots of 0.5 ms
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_t1_after_t2_rejected() {
        let mut config = SlUeConfig::default();
        config.mac.t1 = 40;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_period_not_in_pool_rejected() {
        let mut config = SlUeConfig::default();
        config.mac.reservation_period_ms = 650;
        assert!(config.validate().is_err());
        config.pool.reservation_periods_ms.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ranges_rejected() {
        let mut config = SlUeConfig::default();
        config.mac.resource_percentage = 0;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.mac.sl_prob_resource_keep = 1.5;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.mac.num_sidelink_process = 17;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.pool.max_num_per_reserve = 4;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.mac.sl_max_tx_trans_num_pssch = 33;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.mac.active_pool_id = 3;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.pool.sl_bitmap.clear();
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.numerology = 5;
        assert!(config.validate().is_err());

        let mut config = SlUeConfig::default();
        config.mac.mcs = 29;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sub_channel_size_larger_than_bandwidth() {
        let mut config = SlUeConfig::default();
        config.pool.sub_channel_size_rbs = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
bandwidth_rbs: 200
mac:
  enable_sensing: true
  reservation_period_ms: 50
  t2: 40
  rng_seed: 7
pool:
  sub_channel_size_rbs: 25
  tdd_pattern: [DL, DL, F, UL, UL]
"#;
        let config = SlUeConfig::from_yaml_str(yaml).unwrap();
        assert!(config.mac.enable_sensing);
        assert_eq!(config.mac.rng_seed, Some(7));
        assert_eq!(config.mac.t1, 2);
        assert_eq!(config.total_sub_channels(), 8);
        assert_eq!(config.pool.tdd_pattern[3], TddSlotType::Ul);
        assert_eq!(config.pool.tdd_pattern[2], TddSlotType::Flexible);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = SlUeConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = SlUeConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = SlUeConfig::from_yaml_str("mac: [not, a, map]");
        assert!(matches!(result, Err(Error::YamlParse(_))));
    }

    #[test]
    fn test_from_missing_file() {
        let result = SlUeConfig::from_file("/nonexistent/sidelink.yaml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
