//! Software CAN link engine: the bit-banged transmitter and the
//! non-blocking receiver state machine, glued to the health counters.
//!
//! One [`CanLink`] instance owns the wire, the timer, the counters, and
//! the receiver session. Every operation takes `&mut self`, so the
//! single-writer model the bus requires is enforced by the borrow
//! checker; a multi-threaded host must serialize all calls around the
//! whole instance.
pub mod supervisor;

use crate::error::{ReceiveError, SendError};
use crate::infra::codec::bits::BitSeq;
use crate::infra::codec::crc::crc15;
use crate::infra::codec::stuffing::StuffTracker;
use crate::protocol::frame::{CanFrame, CRC_BITS};
use crate::protocol::health::BusHealth;
use crate::protocol::traits::bit_timer::BitTimer;
use crate::protocol::traits::bit_wire::{BitWire, BusLevel};

//==================================================================================Constants

/// Consecutive recessive bits that close a frame on the receive side.
const EOF_RUN: u8 = 7;

/// Recessive bits driven after the ACK delimiter to close a frame on the
/// transmit side.
const EOF_BITS: usize = 7;

//==================================================================================Config

/// Construction-time configuration for a [`CanLink`].
///
/// The bit time is derived once from the baud rate; there are no other
/// tunables. Software bit-banging is realistic up to roughly 125 kbit/s,
/// depending on how tight the caller's poll loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// Bus baud rate in bits per second.
    pub baudrate: u32,
}

impl LinkConfig {
    /// Duration of one bus bit in microseconds.
    pub fn bit_time_us(&self) -> u32 {
        1_000_000 / self.baudrate.max(1)
    }
}

//==================================================================================Receiver session

/// Receiver progress states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RxState {
    /// No frame in progress.
    Idle,
    /// One dominant bit observed, tentatively a start of frame.
    StartOfFrame,
    /// Accumulating destuffed frame bits.
    InFrame,
}

/// Receiver context carried across non-blocking polls.
#[derive(Debug)]
struct RxSession {
    state: RxState,
    bits: BitSeq,
    tracker: StuffTracker,
    expect_stuff: bool,
    last_sample_us: u64,
}

impl RxSession {
    fn new(now_us: u64) -> Self {
        Self {
            state: RxState::Idle,
            bits: BitSeq::new(),
            tracker: StuffTracker::new(),
            expect_stuff: false,
            last_sample_us: now_us,
        }
    }

    /// Arm the session on a start-of-frame bit. The dominant SOF bit
    /// opens the first stuff run.
    fn begin(&mut self) {
        self.state = RxState::StartOfFrame;
        self.bits.clear();
        self.tracker = StuffTracker::primed(false);
        self.expect_stuff = false;
    }

    fn reset(&mut self) {
        self.state = RxState::Idle;
        self.bits.clear();
        self.tracker = StuffTracker::new();
        self.expect_stuff = false;
    }
}

//==================================================================================Engine

/// Software CAN data-link engine over a bit-level wire.
pub struct CanLink<W: BitWire, T: BitTimer> {
    wire: W,
    timer: T,
    bit_time_us: u32,
    health: BusHealth,
    rx: RxSession,
}

impl<W: BitWire, T: BitTimer> CanLink<W, T> {
    /// Build the engine and leave the bus idle (recessive).
    pub fn new(mut wire: W, timer: T, config: LinkConfig) -> Self {
        wire.drive(BusLevel::Recessive);
        let now = wire.now_us();
        Self {
            timer,
            bit_time_us: config.bit_time_us(),
            health: BusHealth::new(),
            rx: RxSession::new(now),
            wire,
        }
    }

    /// Duration of one bus bit in microseconds.
    pub fn bit_time_us(&self) -> u32 {
        self.bit_time_us
    }

    /// Read-only view of the error counters and node state.
    pub fn health(&self) -> &BusHealth {
        &self.health
    }

    /// Force the receiver back to idle, dropping any frame in progress.
    /// Out-of-band escape hatch for callers that stopped polling.
    pub fn reset_receiver(&mut self) {
        self.rx.reset();
        self.rx.last_sample_us = self.wire.now_us();
    }

    //==================================================================================Transmit

    /// Transmit one data frame, occupying the calling context for the
    /// whole frame duration.
    ///
    /// Arbitration is monitored while recessive bits of the identifier
    /// through data field are on the wire; the ACK slot is sampled after
    /// the CRC delimiter. Failures bump the transmit error counter and
    /// are returned as values; the engine never retries on its own. A
    /// bus-off node fails immediately without touching the wire.
    pub async fn send(&mut self, frame: &CanFrame) -> Result<(), SendError> {
        if self.health.is_bus_off() {
            return Err(SendError::BusOff);
        }
        let outcome = self.transmit(frame).await;
        // The frame occupied the line; the receive cadence restarts from
        // now instead of burst-consuming the elapsed bit slots.
        self.rx.last_sample_us = self.wire.now_us();
        match outcome {
            Ok(()) => {
                self.health.record_transmit_success();
                Ok(())
            }
            Err(err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("transmit failed: {}", err);
                self.health.record_transmit_error();
                Err(err)
            }
        }
    }

    async fn transmit(&mut self, frame: &CanFrame) -> Result<(), SendError> {
        let body = frame.to_bits();
        let crc = crc15(body.iter());

        // Start of frame: dominant, never contested, opens the first
        // stuff run.
        self.drive_bit(BusLevel::Dominant, false).await?;
        let mut tracker = StuffTracker::primed(false);

        // Identifier through data field: stuffed, arbitration monitored.
        for bit in body.iter() {
            self.drive_bit(BusLevel::from_bit(bit), true).await?;
            if tracker.accept(bit) {
                let stuff = tracker.insert();
                self.drive_bit(BusLevel::from_bit(stuff), true).await?;
            }
        }

        // CRC field: still stuffed, arbitration settled by now.
        for shift in (0..CRC_BITS).rev() {
            let bit = (crc >> shift) & 1 == 1;
            self.drive_bit(BusLevel::from_bit(bit), false).await?;
            if tracker.accept(bit) {
                let stuff = tracker.insert();
                self.drive_bit(BusLevel::from_bit(stuff), false).await?;
            }
        }

        // CRC delimiter.
        self.drive_bit(BusLevel::Recessive, false).await?;

        // ACK slot: release the line and listen for one bit time, then
        // return to driving the idle level.
        self.wire.release();
        self.timer.delay_us(self.bit_time_us).await;
        let acked = self.wire.sense().is_dominant();
        self.wire.drive(BusLevel::Recessive);
        if !acked {
            return Err(SendError::AckMissing);
        }

        // ACK delimiter, then end of frame.
        self.drive_bit(BusLevel::Recessive, false).await?;
        for _ in 0..EOF_BITS {
            self.drive_bit(BusLevel::Recessive, false).await?;
        }
        Ok(())
    }

    /// Hold one level on the wire for a full bit time. While sending
    /// recessive in the contested portion, a dominant sample afterwards
    /// means another node won arbitration.
    async fn drive_bit(&mut self, level: BusLevel, contested: bool) -> Result<(), SendError> {
        self.wire.drive(level);
        self.timer.delay_us(self.bit_time_us).await;
        if contested && level == BusLevel::Recessive && self.wire.sense().is_dominant() {
            return Err(SendError::ArbitrationLost);
        }
        Ok(())
    }

    //==================================================================================Receive

    /// Advance the receiver by at most one bus sample.
    ///
    /// Returns `Ok(None)` while no complete frame is available. The
    /// engine self-paces against the wire clock, so polling faster than
    /// the bit time costs nothing; polling slower than the bit time loses
    /// bus edges silently, which makes the once-per-bit-time cadence a
    /// caller obligation. A bus-off node reports no message without
    /// touching the wire or the session.
    pub async fn poll_receive(&mut self) -> Result<Option<CanFrame>, ReceiveError> {
        if self.health.is_bus_off() {
            return Ok(None);
        }

        let now = self.wire.now_us();
        if now.wrapping_sub(self.rx.last_sample_us) < u64::from(self.bit_time_us) {
            return Ok(None);
        }
        // Step by exactly one bit time to keep the sampling cadence.
        self.rx.last_sample_us = self.rx.last_sample_us.wrapping_add(u64::from(self.bit_time_us));

        let level = self.wire.sense();
        match self.rx.state {
            RxState::Idle => {
                if level.is_dominant() {
                    self.rx.begin();
                }
                Ok(None)
            }
            RxState::StartOfFrame => {
                // The start-of-frame bit is consumed; this sample is the
                // first identifier bit, no sample is read twice.
                self.rx.state = RxState::InFrame;
                self.advance_frame(level.to_bit()).await
            }
            RxState::InFrame => self.advance_frame(level.to_bit()).await,
        }
    }

    async fn advance_frame(&mut self, bit: bool) -> Result<Option<CanFrame>, ReceiveError> {
        if self.rx.expect_stuff {
            self.rx.expect_stuff = false;
            if bit != self.rx.tracker.last() {
                // Opposite polarity: a genuine stuff bit, dropped.
                self.rx.tracker.discard(bit);
                return Ok(None);
            }
            if !bit {
                // A sixth dominant bit can only be corruption.
                return self.fail_receive(ReceiveError::StuffViolation);
            }
            // Recessive continuation: the transmitter stopped stuffing
            // after the CRC field and the end-of-frame flag is forming;
            // the run keeps counting below.
        }

        if self.rx.tracker.accept(bit) {
            self.rx.expect_stuff = true;
        }
        if self.rx.bits.push(bit).is_err() {
            return self.fail_receive(ReceiveError::Overflow);
        }
        if bit && self.rx.tracker.run() >= EOF_RUN {
            return self.complete_frame().await;
        }
        Ok(None)
    }

    /// Decode the accumulated bits, verify the CRC, and acknowledge.
    async fn complete_frame(&mut self) -> Result<Option<CanFrame>, ReceiveError> {
        let decoded = match CanFrame::from_bits(&self.rx.bits) {
            Ok(decoded) => decoded,
            Err(err) => return self.fail_receive(err.into()),
        };
        let computed = crc15(self.rx.bits.iter().take(decoded.crc_len));
        if computed != decoded.crc {
            return self.fail_receive(ReceiveError::CrcMismatch {
                computed,
                received: decoded.crc,
            });
        }

        // Acknowledge: one dominant bit in the next sample window, then
        // let go of the line.
        self.timer.delay_us(self.bit_time_us).await;
        self.wire.drive(BusLevel::Dominant);
        self.timer.delay_us(self.bit_time_us).await;
        self.wire.release();

        self.health.record_receive_success();
        self.rx.reset();
        self.rx.last_sample_us = self.wire.now_us();
        Ok(Some(decoded.frame))
    }

    fn fail_receive(&mut self, err: ReceiveError) -> Result<Option<CanFrame>, ReceiveError> {
        #[cfg(feature = "defmt")]
        defmt::debug!("frame dropped: {}", err);
        self.health.record_receive_error();
        self.rx.reset();
        self.rx.last_sample_us = self.wire.now_us();
        Err(err)
    }
}
