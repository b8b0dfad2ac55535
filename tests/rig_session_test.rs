//! Integration tests for a full rig session over the mock transport.

use bytes::Bytes;
use std::path::PathBuf;
use taskrig::adapters::MockTransport;
use taskrig::config::PollConfig;
use taskrig::device_config::DeviceConfig;
use taskrig::poll_loop::{self, LoopState, PollLoop};
use taskrig::protocol::codec::encode_sample;
use taskrig::protocol::{Sample, SignalType, SEPARATOR};
use taskrig::RigEvent;

fn shipped_device() -> DeviceConfig {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/devices");
    DeviceConfig::load(&dir, "default").expect("shipped device config must load")
}

fn sample(signal_type: SignalType, timestamp: u32, value: i32) -> Sample {
    Sample {
        signal_type,
        timestamp,
        value,
    }
}

fn stream(samples: &[Sample]) -> Vec<u8> {
    samples.iter().flat_map(|s| encode_sample(s).to_vec()).collect()
}

#[test]
fn test_session_over_split_reads() {
    let transport = MockTransport::new();
    let mut rig = PollLoop::new(transport.clone(), &shipped_device(), &PollConfig::default())
        .expect("Failed to build poll loop");
    rig.start().unwrap();

    // stale bytes from before the start are gone
    assert!(rig.tick().unwrap().is_empty());

    let bytes = stream(&[
        sample(SignalType::Lever, 100, 0),
        sample(SignalType::LickTouch, 101, 0),
        sample(SignalType::Lever, 101, 0),
        sample(SignalType::LickTouch, 102, 10),
        sample(SignalType::Lever, 102, 300),
        sample(SignalType::LickTouch, 103, 500),
        sample(SignalType::Lever, 103, 0),
        sample(SignalType::Lever, 104, 0),
        sample(SignalType::FrameSync, 105, 1),
        sample(SignalType::PlaySound, 107, 3),
        sample(SignalType::FrameSync, 106, 1),
    ]);

    // leading garbage and a truncated final record
    transport.push_bytes(&[0x12, 0x34]);
    transport.push_bytes(&bytes[..bytes.len() - 4]);
    let events = rig.tick().unwrap();
    assert_eq!(
        events,
        vec![
            // the spike at 102 is filtered, so the lever stays quiet
            RigEvent::LeverTrace {
                values: vec![0, 0, 300, 0, 0],
                timestamps: vec![100, 101, 102, 103, 104],
            },
            RigEvent::Licked,
            RigEvent::SoundPlayed {
                values: vec![3],
                timestamps: vec![107],
            },
            RigEvent::Other {
                name: "frame_sync",
                timestamp: 105,
            },
        ]
    );
    assert_eq!(rig.router().lever().state().previous_mean, 0.0);

    // the tail alone does not exceed the segment threshold
    transport.push_bytes(&bytes[bytes.len() - 4..]);
    assert!(rig.tick().unwrap().is_empty());

    transport.push_sample(sample(SignalType::FrameSync, 108, 1));
    assert_eq!(
        rig.tick().unwrap(),
        vec![RigEvent::Other {
            name: "frame_sync",
            timestamp: 106,
        }]
    );

    assert_eq!(rig.stop(), Some(RigEvent::Finished));
    assert_eq!(rig.state(), LoopState::Stopped);
}

#[test]
fn test_lever_push_after_rest() {
    let transport = MockTransport::new();
    let mut rig = PollLoop::new(transport.clone(), &shipped_device(), &PollConfig::default())
        .unwrap();
    rig.start().unwrap();

    for (ts, value) in [(1, 2), (2, 3), (3, 2)] {
        transport.push_sample(sample(SignalType::Lever, ts, value));
    }
    let events = rig.tick().unwrap();
    assert_eq!(events.len(), 1, "resting lever only yields a trace: {events:?}");

    for (ts, value) in [(4, 10), (5, 80), (6, 90), (7, 85)] {
        transport.push_sample(sample(SignalType::Lever, ts, value));
    }
    let events = rig.tick().unwrap();
    assert_eq!(events.last(), Some(&RigEvent::LeverRise { timestamp: 6 }));
}

#[test]
fn test_unknown_codes_are_dropped() {
    let transport = MockTransport::new();
    let mut rig = PollLoop::new(transport.clone(), &shipped_device(), &PollConfig::default())
        .unwrap();
    rig.start().unwrap();

    transport.push_bytes(&[SEPARATOR, 42, 0, 0, 0, 9, 0, 0, 0, 1]);
    transport.push_sample(sample(SignalType::WaterStart, 10, 0));
    assert_eq!(
        rig.tick().unwrap(),
        vec![RigEvent::Other {
            name: "water_start",
            timestamp: 10,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_handle_drives_water_and_ttl() {
    let transport = MockTransport::new();
    let rig = PollLoop::new(transport.clone(), &shipped_device(), &PollConfig::default())
        .unwrap();
    let (handle, mut events, task) = poll_loop::spawn(rig, 16);

    // 48.5 * 2.0 + 12.0
    handle.give_water(2.0).await.unwrap();
    assert_eq!(
        transport.written(),
        vec![Bytes::from_static(&[SEPARATOR, 0, 0, 0, 0, 109])]
    );

    handle.give_ttl().await.unwrap();
    transport.push_sample(sample(SignalType::SendTtl, 500, 1));
    transport.push_sample(sample(SignalType::SendTtl, 501, 1));
    assert_eq!(
        events.recv().await,
        Some(RigEvent::TtlAcknowledged { timestamp: 500 })
    );

    // a second echo without a new request is not acknowledged
    transport.push_sample(sample(SignalType::SendTtl, 600, 1));
    transport.push_sample(sample(SignalType::FrameSync, 601, 1));
    assert_eq!(
        events.recv().await,
        Some(RigEvent::Other {
            name: "frame_sync",
            timestamp: 601,
        })
    );

    handle.stop().await.unwrap();
    assert_eq!(events.recv().await, Some(RigEvent::Finished));
    task.await.unwrap().unwrap();
}
