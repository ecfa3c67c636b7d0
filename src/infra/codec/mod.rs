//! Bit-granular codecs underlying the CAN wire format: sequence storage,
//! CRC-15 computation, and stuff-bit insertion/removal.
pub mod bits;
pub mod crc;
pub mod stuffing;
