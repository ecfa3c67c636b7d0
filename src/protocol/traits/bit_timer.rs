//! Asynchronous delay abstraction pacing per-bit transmission timing.
use futures_util::Future;

/// Microsecond-resolution delay provider. The delays it produces define
/// the bit time on the wire, so it must run against the same clock the
/// [`BitWire`](super::bit_wire::BitWire) reports.
///
/// # Example
///
/// ```rust,ignore
/// use embassy_time::Timer;
/// use softcan::protocol::traits::bit_timer::BitTimer;
///
/// struct EmbassyTimer;
///
/// impl BitTimer for EmbassyTimer {
///     async fn delay_us(&mut self, micros: u32) {
///         Timer::after_micros(micros as u64).await;
///     }
/// }
/// ```
pub trait BitTimer {
    /// Asynchronously wait for `micros` microseconds.
    fn delay_us<'a>(&'a mut self, micros: u32) -> impl Future<Output = ()> + 'a;
}
