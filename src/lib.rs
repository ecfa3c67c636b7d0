//! `softcan` library: a software implementation of the CAN 2.0A data-link
//! layer over generic digital I/O, for embedded targets that lack a CAN
//! controller peripheral. The crate exposes the bit-level infrastructure
//! (bit sequences, CRC-15, stuff-bit handling), the protocol engine
//! (frame codec, transmitter, non-blocking receiver, health accounting),
//! and a channel-based supervisor service.
#![no_std]
//==================================================================================
/// Domain and low-level errors (bit buffer access, frame decoding,
/// transmission, reception, and related issues).
pub mod error;
/// Bit-granular infrastructure shared by the transmit and receive paths.
pub mod infra;
/// CAN data-link protocol implementation: frame codec, health counters,
/// link engine, and hardware abstraction traits.
pub mod protocol;
//==================================================================================
