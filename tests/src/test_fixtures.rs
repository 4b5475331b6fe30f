//! Test fixtures and configuration helpers

use nrsl_common::SlUeConfig;

/// Baseline UE configuration, as a preconfiguration file would carry it.
pub const UE_CONFIG_YAML: &str = r#"
numerology: 0
bandwidth_rbs: 100
mac:
  enable_sensing: false
  t1: 2
  t2: 33
  reservation_period_ms: 100
  num_sidelink_process: 4
  enable_blind_retx: true
  sl_max_tx_trans_num_pssch: 5
  mcs: 14
pool:
  pool_id: 0
  sub_channel_size_rbs: 50
  max_num_per_reserve: 2
"#;

/// Configuration of UE `src_l2_id` with a fixed seed.
pub fn ue_config(src_l2_id: u32) -> SlUeConfig {
    let mut config = SlUeConfig::from_yaml_str(UE_CONFIG_YAML).expect("fixture YAML is valid");
    config.mac.src_l2_id = src_l2_id;
    config.mac.rng_seed = Some(u64::from(src_l2_id) * 7919);
    config
}

/// Same as [`ue_config`] with sensing based exclusion enabled.
pub fn sensing_ue_config(src_l2_id: u32) -> SlUeConfig {
    let mut config = ue_config(src_l2_id);
    config.mac.enable_sensing = true;
    config
}
