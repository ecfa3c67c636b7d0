//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (bit buffer access,
//! frame decoding, transmission, reception, etc.).
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised by the fixed-capacity bit accumulator.
pub enum BitSeqError {
    /// Attempted to append past the fixed capacity.
    #[error("Bit accumulator full: capacity {capacity} bits")]
    Overflow { capacity: usize },
    /// Attempted to read past the end of the stored bits.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while rebuilding a frame from a destuffed bit sequence.
pub enum FrameCodecError {
    /// The sequence ends before the frame skeleton and CRC are complete.
    #[error("Bit sequence too short for a data frame: {bits} bits")]
    Truncated { bits: usize },
}

//==================================================================================SEND_ERROR

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Transmission failures reported by the link engine. All of them are
/// returned as values; retrying is the caller's decision.
pub enum SendError {
    /// Another node drove dominant while this node drove recessive.
    #[error("Arbitration lost")]
    ArbitrationLost,
    /// No node acknowledged the frame during the ACK slot.
    #[error("No acknowledgement received")]
    AckMissing,
    /// The node is bus-off; the bus was not touched.
    #[error("Node is bus-off")]
    BusOff,
}

//==================================================================================RECEIVE_ERROR

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Reception failures. The offending frame is dropped and the receiver
/// returns to idle; the bus keeps operating.
pub enum ReceiveError {
    /// Recomputed CRC does not match the received CRC field.
    #[error("CRC mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },
    /// The accumulated bits end before the frame skeleton is complete.
    #[error(transparent)]
    Malformed(#[from] FrameCodecError),
    /// The incoming frame exceeded the bit accumulator capacity.
    #[error("Incoming frame overflowed the bit accumulator")]
    Overflow,
    /// A sixth consecutive dominant bit was sampled mid-frame.
    #[error("Stuff violation: six consecutive dominant bits")]
    StuffViolation,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Terminal conditions ending a supervisor run.
pub enum LinkRunError {
    /// The node health degraded to bus-off; the engine refuses further
    /// bus access until it is re-initialized.
    #[error("Node went bus-off")]
    BusOff,
}
