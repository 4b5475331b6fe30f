//! Multi-UE sidelink scenarios
//!
//! UEs share one carrier and only learn about each other through the SCIs
//! they overhear.

use integration_tests::{
    init_test_logging, sensing_ue_config, ue_config, SidelinkNetwork, BROADCAST_DST,
};
use nrsl_mac::MacEvent;

/// A broadcast TB reaches the UE listening to the destination, once
#[test]
fn test_broadcast_delivered_to_listening_ue() {
    init_test_logging();

    let mut network = SidelinkNetwork::new();
    let tx = network.add_ue(ue_config(1));
    let listener = network.add_ue(ue_config(2));
    let bystander = network.add_ue(ue_config(3));

    network.add_tx_channel(tx, BROADCAST_DST, 1);
    network.add_rx_channel(listener, 1, BROADCAST_DST);
    network.report_buffer(tx, BROADCAST_DST, 200);

    network.run(0..=40);

    // five blind transmissions on the air
    assert_eq!(network.tx_slots(tx).len(), 5);

    let received = network.ue(listener).rlc.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].src_l2_id, 1);
    assert_eq!(received[0].dst_l2_id, BROADCAST_DST);
    assert_eq!(received[0].pdu.len(), 200);
    assert!(received[0].pdu.iter().all(|&b| b == 1));

    assert_eq!(network.ue(bystander).rlc.received_count(), 0);
    assert_eq!(network.ue(listener).count("rx_pdu"), 1);

    let sender = network.ue(tx);
    assert_eq!(sender.count("grant_created"), 1);
    assert_eq!(sender.count("harq_released"), 1);
    assert_eq!(sender.mac.harq().available_count(), 4);
}

/// A sensing UE stays clear of the slots another UE reserved
#[test]
fn test_sensing_ue_avoids_reserved_slots() {
    init_test_logging();

    let mut network = SidelinkNetwork::new();
    let first = network.add_ue(ue_config(1));
    let second = network.add_ue(sensing_ue_config(2));

    network.add_tx_channel(first, BROADCAST_DST, 1);
    network.add_tx_channel(second, 256, 1);

    // large enough to span every sub-channel of the pool
    network.report_buffer(first, BROADCAST_DST, 3000);
    network.run(0..=99);

    let first_period = network.tx_slots(first);
    assert_eq!(first_period.len(), 5);
    assert!(network.ue(second).mac.sensing().len() >= 3);

    network.report_buffer(second, 256, 100);
    network.run(100..=140);

    let reserved: Vec<u64> = first_period.iter().map(|slot| slot + 100).collect();
    let first_slots = network.tx_slots(first);
    assert_eq!(&first_slots[5..], reserved.as_slice());

    let second_slots = network.tx_slots(second);
    assert_eq!(second_slots.len(), 5);
    assert!(second_slots.iter().all(|slot| !reserved.contains(slot)));
    assert!(network.collisions().is_empty());
}

/// Destinations of one UE are scheduled in priority order on distinct slots
#[test]
fn test_destinations_served_in_priority_order() {
    init_test_logging();

    let mut network = SidelinkNetwork::new();
    let tx = network.add_ue(ue_config(1));
    let rx = network.add_ue(ue_config(2));

    network.add_tx_channel(tx, 10, 5);
    network.add_tx_channel(tx, 20, 1);
    network.add_rx_channel(rx, 1, 10);
    network.add_rx_channel(rx, 1, 20);
    network.report_buffer(tx, 10, 100);
    network.report_buffer(tx, 20, 100);

    assert_eq!(network.ue(tx).mac.tx_destinations(), &[(20, 1), (10, 5)]);

    network.run(0..=40);

    let created: Vec<u32> = network
        .ue(tx)
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            MacEvent::GrantCreated { dst_l2_id, .. } => Some(*dst_l2_id),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec![20, 10]);

    let mut slots = network.tx_slots(tx);
    assert_eq!(slots.len(), 10);
    slots.dedup();
    assert_eq!(slots.len(), 10);

    assert_eq!(network.ue(rx).rlc.received_count(), 2);
    assert_eq!(network.ue(tx).count("harq_released"), 2);
}
