//! # Buffer Ownership Tests
//!
//! Every buffer obtained through `alloc` must come back exactly once, through
//! `release` or `rx`. These tests drive receptions over the simulated
//! transceiver with a counting pool and check that nothing leaks when frames
//! are dropped, aborted or faulted.

mod common;

use common::{rx_config, tx_packet, Cb, Harness, SETTLE};
use d7a_phy::phy::channel::SyncwordClass;
use d7a_phy::phy::packet::{CrcStatus, TxStatus};
use d7a_phy::{HwEvent, PacketPool, RxConfig};
use std::time::Duration;

/// No buffer available: the frame is dropped without an rx_cb
#[test]
fn test_alloc_none_drops_frame() {
    let h = Harness::with_pool(PacketPool::new(0, 255)).init();
    h.radio.set_rx(rx_config()).unwrap();

    h.receive_frame(&[1, 2, 3, 4, 5], -80);
    assert!(h.events().iter().all(|cb| !matches!(cb, Cb::Rx(_))));
    assert_eq!(h.radio.stats().rx_dropped_no_buffer, 1);
    assert_eq!(h.radio.stats().rx_frames, 0);
    assert_eq!(h.pool.stats().allocation_failures, 1);
    assert_eq!(h.pool.outstanding(), 0);
    assert!(!h.radio.is_rx_busy());
}

/// Without a syncword event the buffer is requested at completion
#[test]
fn test_alloc_none_on_completion_only() {
    let h = Harness::with_pool(PacketPool::new(0, 255)).init();
    h.radio.set_rx(rx_config()).unwrap();

    h.radio.handle_event(HwEvent::RxDone {
        data: vec![9; 12],
        lqi: 10,
        rssi: -95,
        crc: CrcStatus::Valid,
    });
    assert!(h.events().is_empty());
    assert_eq!(h.radio.stats().rx_dropped_no_buffer, 1);
}

/// Dropping one frame does not affect the next one
#[test]
fn test_pool_recovers_after_drop() {
    let h = Harness::with_pool(PacketPool::new(1, 255)).init();
    h.radio.set_rx(rx_config()).unwrap();

    h.receive_frame(&[1], -80);
    // the only buffer is still held by the application
    h.receive_frame(&[2], -80);
    assert_eq!(h.take_events(), vec![Cb::Rx(vec![1])]);
    assert_eq!(h.radio.stats().rx_dropped_no_buffer, 1);

    h.recycle_received();
    h.receive_frame(&[3], -80);
    assert_eq!(h.take_events(), vec![Cb::Rx(vec![3])]);
    h.recycle_received();
    assert_eq!(h.pool.outstanding(), 0);
}

/// Received packets carry reception metadata
#[test]
fn test_rx_metadata() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();
    h.advance(SETTLE * 4);

    h.radio.handle_event(HwEvent::SyncDetected { length: 3 });
    h.radio.handle_event(HwEvent::RxDone {
        data: vec![0xAA, 0xBB, 0xCC],
        lqi: 77,
        rssi: -64,
        crc: CrcStatus::Invalid,
    });

    let received = h.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let meta = received[0].rx_meta().expect("rx metadata");
    assert_eq!(meta.rx_cfg, rx_config());
    assert_eq!(meta.lqi, 77);
    assert_eq!(meta.rssi, -64);
    assert_eq!(meta.crc_status, CrcStatus::Invalid);
    assert_eq!(meta.timestamp, Some(SETTLE * 4));
    assert!(received[0].tx_meta().is_none());
    drop(received);

    let stats = h.radio.stats();
    assert_eq!((stats.rx_frames, stats.rx_crc_errors), (1, 1));
}

/// The RX timestamp is the syncword time, not the completion time
#[test]
fn test_rx_timestamp_taken_at_syncword() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();
    h.advance(Duration::from_millis(3));

    h.radio.handle_event(HwEvent::SyncDetected { length: 2 });
    h.advance(Duration::from_millis(5));
    h.radio.handle_event(HwEvent::RxDone {
        data: vec![1, 2],
        lqi: 20,
        rssi: -70,
        crc: CrcStatus::Valid,
    });

    // no syncword event: stamped when the buffer is allocated
    h.advance(Duration::from_millis(4));
    h.radio.handle_event(HwEvent::RxDone {
        data: vec![3],
        lqi: 20,
        rssi: -70,
        crc: CrcStatus::Valid,
    });

    let stamps: Vec<_> = h
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.rx_meta().and_then(|m| m.timestamp))
        .collect();
    assert_eq!(
        stamps,
        vec![Some(Duration::from_millis(3)), Some(Duration::from_millis(12))]
    );
}

/// Retuning during a reception hands the buffer back once
#[test]
fn test_set_rx_other_config_aborts_reception() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();
    h.radio.handle_event(HwEvent::SyncDetected { length: 9 });
    assert_eq!(h.pool.outstanding(), 1);

    let class1 = RxConfig::new(rx_config().channel_id, SyncwordClass::Class1);
    h.radio.set_rx(class1).unwrap();
    assert!(!h.radio.is_rx_busy());
    assert!(h.events().is_empty());

    h.radio.service();
    assert_eq!(h.events(), vec![Cb::Release]);
    assert_eq!(h.pool.outstanding(), 0);
    assert_eq!(h.radio.stats().rx_aborted, 1);
    assert_eq!(h.radio.rx_config(), Some(class1));

    // the old frame's completion is not delivered under the new config
    h.radio.handle_event(HwEvent::RxFault);
    assert_eq!(h.events(), vec![Cb::Release]);
}

/// A reception fault hands the buffer back through release
#[test]
fn test_rx_fault_releases_buffer() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();

    h.radio.handle_event(HwEvent::SyncDetected { length: 20 });
    assert_eq!(h.pool.outstanding(), 1);
    h.radio.handle_event(HwEvent::RxFault);

    assert_eq!(h.events(), vec![Cb::Release]);
    assert_eq!(h.pool.outstanding(), 0);
    assert_eq!(h.radio.stats().rx_faults, 1);
    assert!(!h.radio.is_rx_busy());
}

/// set_idle aborts a reception; the buffer returns on the next entry
#[test]
fn test_set_idle_aborts_reception() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();
    h.radio.handle_event(HwEvent::SyncDetected { length: 6 });

    h.radio.set_idle().unwrap();
    assert!(h.events().is_empty());
    assert_eq!(h.pool.outstanding(), 1);

    h.radio.service();
    assert_eq!(h.events(), vec![Cb::Release]);
    assert_eq!(h.pool.outstanding(), 0);

    // completion arriving after the abort is ignored
    h.radio.handle_event(HwEvent::RxDone {
        data: vec![0; 6],
        lqi: 0,
        rssi: -90,
        crc: CrcStatus::Valid,
    });
    assert_eq!(h.events(), vec![Cb::Release]);
}

/// Syncwords with impossible lengths are dropped without allocating
#[test]
fn test_invalid_sync_length() {
    let h = Harness::new().init();
    h.radio.set_rx(rx_config()).unwrap();

    h.radio.handle_event(HwEvent::SyncDetected { length: 0 });
    h.radio.handle_event(HwEvent::SyncDetected { length: 300 });
    assert_eq!(h.pool.stats().allocations, 0);
    assert_eq!(h.radio.stats().rx_faults, 2);
}

/// Events in the wrong state leave ownership untouched
#[test]
fn test_events_outside_rx_ignored() {
    let h = Harness::new().init();

    h.radio.handle_event(HwEvent::SyncDetected { length: 4 });
    h.radio.handle_event(HwEvent::TxDone { ok: true });
    assert!(h.events().is_empty());
    assert_eq!(h.pool.stats().allocations, 0);
}

/// Mixed traffic never leaks a pool buffer
#[test]
fn test_no_leak_under_mixed_traffic() {
    let h = Harness::with_pool(PacketPool::new(2, 255)).init();
    h.radio.set_rx(rx_config()).unwrap();

    for round in 0..30u8 {
        match round % 5 {
            0 => h.receive_frame(&[round; 10], -70),
            1 => {
                h.radio.handle_event(HwEvent::SyncDetected { length: 10 });
                h.radio.handle_event(HwEvent::RxFault);
            }
            2 => {
                h.radio.handle_event(HwEvent::SyncDetected { length: 10 });
                h.radio.send_packet(tx_packet(&[round], 0)).unwrap();
                h.radio.handle_event(HwEvent::TxDone { ok: true });
            }
            3 => {
                h.radio.handle_event(HwEvent::SyncDetected { length: 10 });
                h.radio.handle_event(HwEvent::SyncDetected { length: 12 });
                h.radio.service();
            }
            _ => h.recycle_received(),
        }
    }
    h.radio.set_idle().unwrap();
    h.radio.service();
    h.recycle_received();

    assert_eq!(h.pool.outstanding(), 0);
    let stats = h.pool.stats();
    assert_eq!(stats.allocations, stats.returns);

    let tx = h
        .events()
        .iter()
        .filter(|cb| matches!(cb, Cb::Tx(TxStatus::Sent, _)))
        .count();
    assert_eq!(tx, 6);
}
