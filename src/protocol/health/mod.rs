//! Transmit/receive error counters and the node state they derive.
//! A node degrades from error-active to error-passive and finally
//! bus-off as errors accumulate, and recovers one step per successful
//! operation, per the CAN fault-confinement rules.

/// Counter increment applied on a transmit error.
const TX_ERROR_STEP: u16 = 8;
/// Counter value above which the node turns error-passive.
const PASSIVE_LIMIT: u16 = 127;
/// Counter value above which the node disconnects.
const BUS_OFF_LIMIT: u16 = 255;

/// Operational state of the node, derived from the error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeState {
    /// Normal operation.
    ErrorActive,
    /// Degraded; the node still participates on the bus.
    ErrorPassive,
    /// Disconnected; no transmission or reception is permitted until the
    /// node is re-initialized.
    BusOff,
}

/// Error counters and derived state.
///
/// The state is a pure function of the two counters and is recomputed
/// after every mutation, never stored independently of them. Once
/// bus-off is reached the counters freeze; only external
/// re-initialization brings the node back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusHealth {
    tec: u16,
    rec: u16,
    state: NodeState,
}

impl BusHealth {
    /// Fresh counters: error-active with both counters at zero.
    pub const fn new() -> Self {
        Self {
            tec: 0,
            rec: 0,
            state: NodeState::ErrorActive,
        }
    }

    /// Transmit error counter.
    pub fn transmit_errors(&self) -> u16 {
        self.tec
    }

    /// Receive error counter.
    pub fn receive_errors(&self) -> u16 {
        self.rec
    }

    /// Current operational state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Whether the node is disconnected from the bus.
    pub fn is_bus_off(&self) -> bool {
        self.state == NodeState::BusOff
    }

    /// Account a failed transmission (arbitration lost, missing ACK).
    pub fn record_transmit_error(&mut self) {
        if self.is_bus_off() {
            return;
        }
        self.tec += TX_ERROR_STEP;
        self.update_state();
    }

    /// Account a dropped incoming frame (CRC mismatch, malformed).
    pub fn record_receive_error(&mut self) {
        if self.is_bus_off() {
            return;
        }
        self.rec += 1;
        self.update_state();
    }

    /// Account a completed transmission.
    pub fn record_transmit_success(&mut self) {
        if self.is_bus_off() {
            return;
        }
        self.tec = self.tec.saturating_sub(1);
        self.update_state();
    }

    /// Account a completed reception.
    pub fn record_receive_success(&mut self) {
        if self.is_bus_off() {
            return;
        }
        self.rec = self.rec.saturating_sub(1);
        self.update_state();
    }

    fn update_state(&mut self) {
        let next = if self.tec > BUS_OFF_LIMIT || self.rec > BUS_OFF_LIMIT {
            NodeState::BusOff
        } else if self.tec > PASSIVE_LIMIT || self.rec > PASSIVE_LIMIT {
            NodeState::ErrorPassive
        } else {
            NodeState::ErrorActive
        };
        #[cfg(feature = "defmt")]
        if next != self.state {
            defmt::warn!(
                "node state {} -> {} (tec={} rec={})",
                self.state,
                next,
                self.tec,
                self.rec
            );
        }
        self.state = next;
    }
}

impl Default for BusHealth {
    fn default() -> Self {
        Self::new()
    }
}
