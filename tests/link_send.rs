//! Transmit-path scenarios: the driven waveform, arbitration loss, the
//! ACK slot, and bus-off gating.

mod helpers;

use embedded_can::StandardId;
use helpers::{stuffed_frame_samples, SimWire};
use softcan::error::SendError;
use softcan::protocol::frame::CanFrame;
use softcan::protocol::health::NodeState;
use softcan::protocol::link::{CanLink, LinkConfig};
use softcan::protocol::traits::bit_wire::BusLevel;

const CONFIG: LinkConfig = LinkConfig { baudrate: 125_000 };

fn frame_0x123() -> CanFrame {
    CanFrame::new(StandardId::new(0x123).unwrap(), &[0xFF, 0x00])
}

#[tokio::test]
/// An acknowledged transmission drives exactly the stuffed wire
/// sequence, the delimiters, and the end-of-frame flag.
async fn acknowledged_send_drives_the_full_frame() {
    let (wire, timer) = SimWire::new();
    wire.state.borrow_mut().ack_responder = true;
    let mut link = CanLink::new(wire.clone(), timer, CONFIG);
    let frame = frame_0x123();

    link.send(&frame).await.expect("peer acknowledges");

    let mut expected = vec![Some(BusLevel::Recessive)]; // idle after init
    expected.extend(stuffed_frame_samples(&frame).into_iter().map(Some));
    expected.push(Some(BusLevel::Recessive)); // CRC delimiter
    expected.push(None); // released for the ACK slot
    expected.push(Some(BusLevel::Recessive)); // back to idle after the slot
    expected.push(Some(BusLevel::Recessive)); // ACK delimiter
    expected.extend([Some(BusLevel::Recessive); 7]); // end of frame
    assert_eq!(wire.driven_levels(), expected);

    assert_eq!(link.health().transmit_errors(), 0);
    assert_eq!(link.health().state(), NodeState::ErrorActive);
}

#[tokio::test]
/// A dominant level sensed while driving recessive aborts the frame with
/// an arbitration loss and steps the transmit counter by exactly eight.
async fn dominant_level_loses_arbitration() {
    let (wire, timer) = SimWire::new();
    wire.state.borrow_mut().force_dominant_from = Some(0);
    let mut link = CanLink::new(wire.clone(), timer, CONFIG);
    let frame = frame_0x123();

    assert_eq!(link.send(&frame).await, Err(SendError::ArbitrationLost));
    assert_eq!(link.health().transmit_errors(), 8);

    // Each further loss adds exactly eight on top of the prior value.
    assert_eq!(link.send(&frame).await, Err(SendError::ArbitrationLost));
    assert_eq!(link.health().transmit_errors(), 16);
}

#[tokio::test]
/// A recessive ACK slot fails the send after the whole frame body went
/// out, and the line is left idle.
async fn silent_bus_means_ack_missing() {
    let (wire, timer) = SimWire::new();
    let mut link = CanLink::new(wire.clone(), timer, CONFIG);
    let frame = frame_0x123();

    assert_eq!(link.send(&frame).await, Err(SendError::AckMissing));
    assert_eq!(link.health().transmit_errors(), 8);

    let driven = wire.driven_levels();
    // The failure path stops after re-driving idle: no ACK delimiter, no
    // end-of-frame flag.
    assert_eq!(driven.last(), Some(&Some(BusLevel::Recessive)));
    let body_len = stuffed_frame_samples(&frame).len();
    assert_eq!(driven.len(), 1 + body_len + 1 + 1 + 1);
}

#[tokio::test]
/// A successful exchange walks an earlier failure back down.
async fn success_recovers_the_transmit_counter() {
    let (wire, timer) = SimWire::new();
    let mut link = CanLink::new(wire.clone(), timer, CONFIG);
    let frame = frame_0x123();

    assert_eq!(link.send(&frame).await, Err(SendError::AckMissing));
    assert_eq!(link.health().transmit_errors(), 8);

    wire.state.borrow_mut().ack_responder = true;
    link.send(&frame).await.expect("peer acknowledges now");
    assert_eq!(link.health().transmit_errors(), 7);
}

#[tokio::test]
/// Once bus-off, neither path touches the wire: send refuses without a
/// single drive call and the receiver stops sampling.
async fn bus_off_gates_both_paths() {
    let (wire, timer) = SimWire::new();
    let mut link = CanLink::new(wire.clone(), timer, CONFIG);
    let frame = frame_0x123();

    // Thirty-two unacknowledged sends: 32 * 8 = 256 pushes the node out.
    for _ in 0..32 {
        assert_eq!(link.send(&frame).await, Err(SendError::AckMissing));
    }
    assert_eq!(link.health().state(), NodeState::BusOff);
    assert_eq!(link.health().transmit_errors(), 256);

    let drives_before = wire.state.borrow().drive_log.len();
    let senses_before = wire.state.borrow().sense_calls;

    assert_eq!(link.send(&frame).await, Err(SendError::BusOff));
    assert_eq!(wire.state.borrow().drive_log.len(), drives_before);

    // Even a dominant line goes unseen: the receiver does not advance.
    wire.script([BusLevel::Dominant; 4]);
    for _ in 0..4 {
        wire.advance_us(u64::from(link.bit_time_us()));
        assert_eq!(link.poll_receive().await.unwrap(), None);
    }
    assert_eq!(wire.state.borrow().sense_calls, senses_before);
    assert_eq!(wire.state.borrow().rx_script.len(), 4);
}
