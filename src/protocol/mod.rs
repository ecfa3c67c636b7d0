//! CAN data-link protocol implementation: frame representation and codec,
//! error-counter health accounting, the bit-banged link engine, and the
//! hardware abstraction traits it is driven through.
pub mod frame;
pub mod health;
pub mod link;
pub mod traits;
