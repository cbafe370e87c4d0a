#![cfg_attr(not(test), no_std)]

//! Clocking and link-training control engine for a multi-lane gigabit
//! transceiver video PHY.
//!
//! The driver computes integer PLL divisor sets realizing a requested serial
//! line rate from the available reference clock, drives the per-lane
//! reset/lock/align/ready bring-up sequence over an indirect poll-based
//! register protocol, and reacts to reference-clock frequency-change
//! interrupts, falling back to a fixed-rate data recovery unit (DRU) when the
//! incoming clock is too slow for native PLL operation.
//!
//! The PHY core is memory mapped; platform integration supplies a
//! [`RegisterBus`] over that block and an `embedded_hal` delay provider for
//! the bounded settle/poll waits. All device methods take `&mut self`:
//! exclusive access per device is the caller's obligation (a mutex, a
//! critical section, or single-task ownership). Interrupt integration is
//! two-phase: a top half masks the pending sources
//! ([`intr_disable`](GtPhy::intr_disable)) and defers; the deferred context
//! calls [`handle_interrupt`](GtPhy::handle_interrupt), which may poll for up
//! to tens of milliseconds and delivers completion events through a borrowed
//! [`EventSink`].

pub mod access;
pub mod channel;
pub mod clkdet;
pub mod config;
pub mod constants;
pub mod device;
pub mod errors;
pub mod intr;
pub mod mmcm;
pub mod pll;
pub mod registers;

pub use access::RegisterBus;
pub use channel::GtState;
pub use config::{ChannelId, DeviceConfig, Direction, GtType, PllType};
pub use device::{EventSink, GtPhy, Loopback};
pub use errors::Error;
pub use pll::Divisors;
pub use registers::Intr;

#[cfg(test)]
pub(crate) mod test_support;
