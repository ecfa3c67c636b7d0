//! Test doubles to simulate the bit-level wire and timer during
//! integration tests. The clock is virtual: timer delays advance it
//! instantly, which makes whole-frame scenarios deterministic and fast.
use softcan::infra::codec::crc::crc15;
use softcan::infra::codec::stuffing::StuffTracker;
use softcan::protocol::frame::{CanFrame, CRC_BITS};
use softcan::protocol::traits::bit_timer::BitTimer;
use softcan::protocol::traits::bit_wire::{BitWire, BusLevel};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Shared state behind a [`SimWire`]/[`SimTimer`] pair.
pub struct SimState {
    /// Virtual monotonic clock in microseconds.
    pub now_us: u64,
    /// Level currently driven by the node under test, if any.
    pub driven: Option<BusLevel>,
    /// Scripted levels returned by `sense`, front first. When empty the
    /// wire behaves like a quiet bus (see `sense`).
    pub rx_script: VecDeque<BusLevel>,
    /// When set, `sense` reports dominant from this timestamp on,
    /// overriding the driven level (arbitration scenarios).
    pub force_dominant_from: Option<u64>,
    /// Whether a peer pulls the line dominant while the node listens
    /// released (acknowledgement scenarios).
    pub ack_responder: bool,
    /// Every `drive`/`release` call with its timestamp (`None` = release).
    pub drive_log: Vec<(u64, Option<BusLevel>)>,
    /// Number of `sense` calls observed.
    pub sense_calls: usize,
}

/// In-memory bus line shared with a [`SimTimer`] over the same clock.
#[derive(Clone)]
pub struct SimWire {
    pub state: Rc<RefCell<SimState>>,
}

/// Timer advancing the shared virtual clock instead of sleeping.
#[derive(Clone)]
pub struct SimTimer {
    state: Rc<RefCell<SimState>>,
}

#[allow(dead_code)]
impl SimWire {
    /// Build an interconnected wire/timer pair over a fresh clock.
    pub fn new() -> (Self, SimTimer) {
        let state = Rc::new(RefCell::new(SimState {
            now_us: 0,
            driven: None,
            rx_script: VecDeque::new(),
            force_dominant_from: None,
            ack_responder: false,
            drive_log: Vec::new(),
            sense_calls: 0,
        }));
        (
            Self {
                state: state.clone(),
            },
            SimTimer { state },
        )
    }

    /// Advance the virtual clock without driving anything.
    pub fn advance_us(&self, micros: u64) {
        self.state.borrow_mut().now_us += micros;
    }

    /// Append scripted sample levels for the receive path.
    pub fn script(&self, levels: impl IntoIterator<Item = BusLevel>) {
        self.state.borrow_mut().rx_script.extend(levels);
    }

    /// Levels driven since construction, in order, `None` for releases.
    pub fn driven_levels(&self) -> Vec<Option<BusLevel>> {
        self.state
            .borrow()
            .drive_log
            .iter()
            .map(|(_, level)| *level)
            .collect()
    }
}

impl BitWire for SimWire {
    fn drive(&mut self, level: BusLevel) {
        let mut state = self.state.borrow_mut();
        state.driven = Some(level);
        let now = state.now_us;
        state.drive_log.push((now, Some(level)));
    }

    fn release(&mut self) {
        let mut state = self.state.borrow_mut();
        state.driven = None;
        let now = state.now_us;
        state.drive_log.push((now, None));
    }

    fn sense(&mut self) -> BusLevel {
        let mut state = self.state.borrow_mut();
        state.sense_calls += 1;
        if let Some(level) = state.rx_script.pop_front() {
            return level;
        }
        if let Some(from) = state.force_dominant_from {
            if state.now_us >= from {
                return BusLevel::Dominant;
            }
        }
        match state.driven {
            // A lone node reads back what it drives.
            Some(level) => level,
            None => {
                if state.ack_responder {
                    BusLevel::Dominant
                } else {
                    BusLevel::Recessive
                }
            }
        }
    }

    fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }
}

impl BitTimer for SimTimer {
    async fn delay_us(&mut self, micros: u32) {
        self.state.borrow_mut().now_us += u64::from(micros);
        tokio::task::yield_now().await;
    }
}

//==================================================================================Wire sequences

/// Samples a transmitter puts on the wire for one frame, up to and
/// including the CRC field: SOF, then the stuffed body and CRC with the
/// SOF bit seeding the stuff run.
#[allow(dead_code)]
pub fn stuffed_frame_samples(frame: &CanFrame) -> Vec<BusLevel> {
    let body = frame.to_bits();
    let crc = crc15(body.iter());

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
    for shift in (0..CRC_BITS).rev() {
        emit((crc >> shift) & 1 == 1, &mut samples, &mut tracker);
    }
    samples
}

/// Full receive script for one frame: the stuffed samples followed by a
/// recessive tail long enough for the receiver to see end of frame.
#[allow(dead_code)]
pub fn receive_script(frame: &CanFrame) -> Vec<BusLevel> {
    let mut samples = stuffed_frame_samples(frame);
    // CRC delimiter, ACK slot, ACK delimiter, and EOF all read recessive
    // on a quiet line.
    samples.extend([BusLevel::Recessive; 10]);
    samples
}
