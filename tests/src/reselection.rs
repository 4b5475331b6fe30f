//! Semi-persistent reservation lifecycle over many periods

use integration_tests::{init_test_logging, ue_config, SidelinkNetwork, BROADCAST_DST};
use nrsl_common::SlUeConfig;
use nrsl_mac::MacEvent;

fn single_tx_config(prob_keep: f64) -> SlUeConfig {
    let mut config = ue_config(1);
    config.mac.enable_blind_retx = false;
    config.mac.sl_prob_resource_keep = prob_keep;
    config
}

fn grants_created(events: &[MacEvent]) -> Vec<(usize, u8, u32)> {
    events
        .iter()
        .enumerate()
        .filter_map(|(i, event)| match event {
            MacEvent::GrantCreated {
                resel_counter,
                c_resel,
                ..
            } => Some((i, *resel_counter, *c_resel)),
            _ => None,
        })
        .collect()
}

/// Once every TB of the reservation was sent, new resources are selected
#[test]
fn test_reselects_after_counter_expiry() {
    init_test_logging();

    let mut network = SidelinkNetwork::new();
    let ue = network.add_ue(single_tx_config(0.0));
    network.add_tx_channel(ue, BROADCAST_DST, 1);
    network.report_buffer(ue, BROADCAST_DST, 100_000);

    network.run(0..=1700);

    let events = network.ue(ue).events.lock().unwrap().clone();
    let grants = grants_created(&events);
    assert!(grants.len() >= 2, "expected a reselection, got {grants:?}");
    for &(_, resel_counter, c_resel) in &grants {
        assert!((5..=15).contains(&resel_counter));
        assert_eq!(c_resel, u32::from(resel_counter) * 10);
    }

    // one transmission per TB until the counter runs out
    let (first, resel_counter, _) = grants[0];
    let (second, _, _) = grants[1];
    let sent = events[first..second]
        .iter()
        .filter(|event| matches!(event, MacEvent::PsschScheduled(_)))
        .count();
    assert_eq!(sent, usize::from(resel_counter));
}

/// With a keep probability of one the UE never leaves its first resources
#[test]
fn test_keeps_reservation_with_probability_one() {
    init_test_logging();

    let mut network = SidelinkNetwork::new();
    let ue = network.add_ue(single_tx_config(1.0));
    network.add_tx_channel(ue, BROADCAST_DST, 1);
    network.report_buffer(ue, BROADCAST_DST, 100_000);

    network.run(0..=1700);

    let node = network.ue(ue);
    assert_eq!(node.count("grant_created"), 1);
    assert!(node.count("resource_kept") >= 1);

    let slots = network.tx_slots(ue);
    assert_eq!(slots.len(), 17);
    assert!(slots.iter().all(|slot| slot % 100 == slots[0] % 100));
}

/// Short reservation periods scale the reselection counter
#[test]
fn test_short_reservation_period() {
    init_test_logging();

    let mut config = single_tx_config(0.0);
    config.mac.reservation_period_ms = 20;
    config.mac.t2 = 19;
    assert!(config.validate().is_ok());

    let mut network = SidelinkNetwork::new();
    let ue = network.add_ue(config);
    network.add_tx_channel(ue, BROADCAST_DST, 1);
    network.report_buffer(ue, BROADCAST_DST, 1000);

    network.run(0..=100);

    let events = network.ue(ue).events.lock().unwrap().clone();
    let grants = grants_created(&events);
    assert_eq!(grants.len(), 1);
    assert!((25..=75).contains(&grants[0].1));

    let slots = network.tx_slots(ue);
    assert!(slots.len() >= 4);
    assert!(slots.windows(2).all(|w| w[1] - w[0] == 20));
}
