//! # Quickstart Example
//!
//! Minimal example demonstrating the basics of softcan:
//! - Build a data frame and inspect its wire-level bits
//! - Replay a bit-banged wire sequence into the non-blocking receiver
//! - Watch the health counters react to a missing acknowledgement
//!
//! The "bus" here is a simulated wire with a virtual clock, so the
//! example runs on any desktop.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use softcan::infra::codec::crc::crc15;
use softcan::infra::codec::stuffing::{stuff, StuffTracker};
use softcan::protocol::frame::CanFrame;
use softcan::protocol::link::{CanLink, LinkConfig};
use softcan::protocol::traits::bit_timer::BitTimer;
use softcan::protocol::traits::bit_wire::{BitWire, BusLevel};

use embedded_can::StandardId;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Simulated line: a virtual clock, a scripted level sequence for the
/// receive path, and a log of everything the node drives.
struct WireState {
    now_us: u64,
    script: VecDeque<BusLevel>,
    driven: Option<BusLevel>,
}

#[derive(Clone)]
struct DemoWire(Rc<RefCell<WireState>>);

#[derive(Clone)]
struct DemoTimer(Rc<RefCell<WireState>>);

impl BitWire for DemoWire {
    fn drive(&mut self, level: BusLevel) {
        self.0.borrow_mut().driven = Some(level);
    }
    fn release(&mut self) {
        self.0.borrow_mut().driven = None;
    }
    fn sense(&mut self) -> BusLevel {
        let mut state = self.0.borrow_mut();
        state
            .script
            .pop_front()
            .or(state.driven)
            .unwrap_or(BusLevel::Recessive)
    }
    fn now_us(&self) -> u64 {
        self.0.borrow().now_us
    }
}

impl BitTimer for DemoTimer {
    async fn delay_us(&mut self, micros: u32) {
        // Virtual time: no real sleeping needed.
        self.0.borrow_mut().now_us += u64::from(micros);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== softcan Quickstart ===\n");

    // ======================================================================
    // 1. Build a frame and look at its wire material
    // ======================================================================
    println!("1. Building a data frame");

    let frame = CanFrame::new(StandardId::new(0x123).unwrap(), &[0xFF, 0x00]);
    let body = frame.to_bits();
    let crc = crc15(body.iter());
    let stuffed = stuff(&body).unwrap();

    println!("   Identifier: 0x{:03X}", frame.id_raw());
    println!("   DLC: {}", frame.dlc());
    println!("   Body bits (pre-stuffing): {:?}", body);
    println!("   CRC-15: 0x{:04X}", crc);
    println!(
        "   Stuffing added {} bit(s)\n",
        stuffed.len() - body.len()
    );

    // ======================================================================
    // 2. Replay the frame into the receiver, one bit time per poll
    // ======================================================================
    println!("2. Receiving the frame over a simulated wire");

    let state = Rc::new(RefCell::new(WireState {
        now_us: 0,
        script: VecDeque::new(),
        driven: None,
    }));
    let wire = DemoWire(state.clone());
    let mut link = CanLink::new(
        wire.clone(),
        DemoTimer(state.clone()),
        LinkConfig { baudrate: 125_000 },
    );

    // The wire sequence a transmitter would produce: start of frame, then
    // the body and CRC stuffed with the SOF bit seeding the run, then a
    // quiet (recessive) tail.
    let mut samples = vec![BusLevel::Dominant];
    let mut tracker = StuffTracker::primed(false);
    let emit = |bit: bool, samples: &mut Vec<BusLevel>, tracker: &mut StuffTracker| {
        samples.push(BusLevel::from_bit(bit));
        if tracker.accept(bit) {
            samples.push(BusLevel::from_bit(tracker.insert()));
        }
    };
    for bit in body.iter() {
        emit(bit, &mut samples, &mut tracker);
    }
    for shift in (0..15).rev() {
        emit((crc >> shift) & 1 == 1, &mut samples, &mut tracker);
    }
    samples.extend([BusLevel::Recessive; 10]);
    state.borrow_mut().script.extend(samples);

    let bit_time = u64::from(link.bit_time_us());
    let received = loop {
        state.borrow_mut().now_us += bit_time;
        match link.poll_receive().await {
            Ok(Some(frame)) => break frame,
            Ok(None) => continue,
            Err(err) => panic!("receive failed: {err:?}"),
        }
    };

    println!("   Received id: 0x{:03X}", received.id_raw());
    println!("   Received data: {:02X?}", received.data());
    println!(
        "   Health: tec={} rec={} state={:?}\n",
        link.health().transmit_errors(),
        link.health().receive_errors(),
        link.health().state()
    );

    // ======================================================================
    // 3. Transmit into the void and watch the counters react
    // ======================================================================
    println!("3. Sending without a peer on the bus");

    match link.send(&frame).await {
        Ok(()) => println!("   Unexpected success"),
        Err(err) => println!("   Send failed as expected: {err:?}"),
    }
    println!(
        "   Health after the failure: tec={} state={:?}",
        link.health().transmit_errors(),
        link.health().state()
    );

    println!("\nQuickstart complete.");
}
