//! Abstraction traits used by the link engine (bit-level wire and timer).
pub mod bit_timer;
pub mod bit_wire;
