//! Clock detector and degraded-rate recovery unit
//!
//! Frequency-change interrupts carry no value; the actual reference
//! frequency is read from the detector's measurement register, rounded to a
//! coarse granularity, and compared against the per-type minimum usable PLL
//! input frequency. Below that minimum the lane can only run through the
//! recovery unit (when fitted): a fixed low line rate, a narrowed datapath,
//! and center-frequency/gain programming derived from the measured clock and
//! the committed divisors.

use embedded_hal::blocking::delay::DelayUs;

use crate::access::{rmw, RegisterBus};
use crate::config::{Direction, GtType, PllType};
use crate::constants::*;
use crate::errors::*;
use crate::pll::{self, Divisors};
use crate::registers::*;

/// Minimum usable PLL reference input frequency, Hz
pub fn min_pll_refclk_hz(gt: GtType) -> u64 {
    match gt {
        GtType::Gtxe2 => 60_000_000,
        GtType::Gthe3 | GtType::Gthe4 => 61_250_000,
        GtType::Gtpe2 => 80_000_000,
    }
}

/// Round a measured frequency to [`CLKDET_FREQ_GRANULARITY_HZ`]
pub fn round_freq_hz(hz: u64) -> u64 {
    (hz + CLKDET_FREQ_GRANULARITY_HZ / 2) / CLKDET_FREQ_GRANULARITY_HZ
        * CLKDET_FREQ_GRANULARITY_HZ
}

/// Start the frequency counters
pub(crate) fn enable<B: RegisterBus>(bus: &mut B, base: u32) -> Result<(), Error> {
    rmw(bus, base + CLKDET_CTRL, CLKDET_RUN_MASK, true)
}

/// Measured reference clock for a direction, rounded; zero while the
/// detector has not completed a measurement window
pub(crate) fn measured_refclk_hz<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    dir: Direction,
) -> Result<u64, Error> {
    let raw = bus.read(base + clkdet_freq(dir))?;
    Ok(round_freq_hz(raw as u64))
}

/// Restart a direction's frequency measurement window
pub(crate) fn reset_freq<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    dir: Direction,
) -> Result<(), Error> {
    let mask = match dir {
        Direction::Tx => CLKDET_TX_FREQ_RST_MASK,
        Direction::Rx => CLKDET_RX_FREQ_RST_MASK,
    };
    rmw(bus, base + CLKDET_CTRL, mask, true)
}

/// Arm a direction's watchdog timer for `ms` milliseconds
pub(crate) fn arm_timer<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    dir: Direction,
    sys_clk_hz: u32,
    ms: u32,
) -> Result<(), Error> {
    let ticks = (sys_clk_hz as u64 / 1000) * ms as u64;
    bus.write(base + clkdet_tmr(dir), ticks as u32)
}

/// Stop and clear a direction's watchdog timer
pub(crate) fn clear_timer<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    dir: Direction,
) -> Result<(), Error> {
    bus.write(base + clkdet_tmr(dir), 0)?;
    let mask = match dir {
        Direction::Tx => CLKDET_TX_TMR_CLR_MASK,
        Direction::Rx => CLKDET_RX_TMR_CLR_MASK,
    };
    rmw(bus, base + CLKDET_CTRL, mask, true)
}

/// DRU center-frequency code: the incoming bit rate implied by the measured
/// reference and the committed divisors, expressed in units of the DRU
/// reference with a fixed 2^32 scale
pub fn center_freq_code(
    gt: GtType,
    pll: PllType,
    measured_refclk_hz: u64,
    div: &Divisors,
    dru_refclk_hz: u64,
) -> u64 {
    let rate = pll::line_rate_hz(gt, pll, measured_refclk_hz, div);
    (rate << DRU_CFREQ_SHIFT) / dru_refclk_hz
}

/// Program a lane's recovery unit: center frequency, loop gains, enable
pub(crate) fn program<B, D>(
    bus: &mut B,
    _delay: &mut D,
    base: u32,
    lane: usize,
    cfreq: u64,
) -> Result<(), Error>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    bus.write(base + dru_cfreq_l(lane), cfreq as u32)?;
    bus.write(base + dru_cfreq_h(lane), (cfreq >> 32) as u32)?;

    let gain = Reg::<DruGainReg>::default()
        .set(DruG1(DRU_GAIN_G1))
        .set(DruG1P(DRU_GAIN_G1_P))
        .set(DruG2(DRU_GAIN_G2));
    bus.write(base + dru_gain(lane), gain.w)?;

    rmw(bus, base + DRU_CTRL, dru_en(lane), true)
}

/// Hold or release a lane's recovery unit reset
pub(crate) fn set_reset<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    lane: usize,
    hold: bool,
) -> Result<(), Error> {
    rmw(bus, base + DRU_CTRL, dru_rst(lane), hold)
}

/// Take a lane's recovery unit out of the datapath
pub(crate) fn disable<B: RegisterBus>(bus: &mut B, base: u32, lane: usize) -> Result<(), Error> {
    rmw(bus, base + DRU_CTRL, dru_en(lane), false)
}
