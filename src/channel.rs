//! Quad and channel records
//!
//! Created once at device construction, mutated only through the device's
//! exclusive (`&mut self`) entry points, never destroyed while the device is
//! active; a reconfiguration overwrites in place. Every per-direction datum
//! is a direction-indexed parallel array (`[_; 2]`, indexed by
//! [`Direction::idx`]).

use crate::config::{DataWidth, Direction};
use crate::constants::*;
use crate::mmcm::MmcmParams;
use crate::pll::Divisors;

/// Per-direction bring-up state.
///
/// Progression is `Idle → Reset → {Lock | Align} → Ready` for TX (which
/// intermediate state applies depends on the transceiver type) and
/// `Idle → Reset → Ready` for RX. A reference-clock frequency change forces
/// the affected direction back to `Idle` from any state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GtState {
    Idle,
    Reset,
    Lock,
    Align,
    Ready,
}

impl Default for GtState {
    fn default() -> Self {
        GtState::Idle
    }
}

/// Committed per-lane, per-direction parameters
#[derive(Debug, Copy, Clone, Default)]
pub struct LaneParams {
    /// Serial line rate, Hz; zero until first commit
    pub line_rate_hz: u64,
    /// Committed divisor set, satisfying
    /// `line_rate = refclk * n1 * n2 * doubling / (m * d)` exactly
    pub divisors: Divisors,
    /// Reference clock the divisors were computed from, Hz
    pub refclk_hz: u64,
    /// Effective datapath width (forced to `W20` under DRU operation)
    pub data_width: Option<DataWidth>,
}

/// One lane of a quad
#[derive(Debug, Copy, Clone, Default)]
pub struct Channel {
    /// Bring-up state per direction
    pub state: [GtState; 2],
    /// Committed parameters per direction
    pub params: [LaneParams; 2],
    /// Recovery unit re-timing this lane's RX stream
    pub dru_active: bool,
}

impl Channel {
    #[inline]
    pub fn state(&self, dir: Direction) -> GtState {
        self.state[dir.idx()]
    }

    #[inline]
    pub fn params(&self, dir: Direction) -> &LaneParams {
        &self.params[dir.idx()]
    }
}

/// Up to four lanes plus two shared PLLs on common reference clocks
#[derive(Debug, Copy, Clone, Default)]
pub struct Quad {
    pub channels: [Channel; CHANNELS_PER_QUAD],
    /// User-clock generator parameters per direction, once computed
    pub mmcm: [Option<MmcmParams>; 2],
    /// Last requested line rate per direction; replayed by the watchdog
    /// reconfiguration pass
    pub requested_rate_hz: [u64; 2],
}

impl Quad {
    /// Set every active lane's state for a direction
    pub(crate) fn set_all_states(&mut self, dir: Direction, lanes: usize, state: GtState) {
        for ch in self.channels.iter_mut().take(lanes) {
            ch.state[dir.idx()] = state;
        }
    }

    /// True when every active lane of `dir` is in `state`
    pub(crate) fn all_in_state(&self, dir: Direction, lanes: usize, state: GtState) -> bool {
        lanes > 0
            && self
                .channels
                .iter()
                .take(lanes)
                .all(|ch| ch.state[dir.idx()] == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_start_idle() {
        let q = Quad::default();
        assert!(q.all_in_state(Direction::Tx, 4, GtState::Idle));
        assert!(q.all_in_state(Direction::Rx, 4, GtState::Idle));
    }

    #[test]
    fn set_all_states_touches_only_active_lanes() {
        let mut q = Quad::default();
        q.set_all_states(Direction::Tx, 2, GtState::Reset);
        assert_eq!(q.channels[0].state(Direction::Tx), GtState::Reset);
        assert_eq!(q.channels[1].state(Direction::Tx), GtState::Reset);
        assert_eq!(q.channels[2].state(Direction::Tx), GtState::Idle);
        // RX untouched
        assert_eq!(q.channels[0].state(Direction::Rx), GtState::Idle);
    }

    #[test]
    fn no_lanes_is_never_all_in_state() {
        let q = Quad::default();
        assert!(!q.all_in_state(Direction::Tx, 0, GtState::Idle));
    }
}
