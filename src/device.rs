//! PHY device: consumer API and the reset/lock/align state machine
//!
//! One [`GtPhy`] instance owns the register bus, the delay provider, and all
//! quad/channel state. Methods take `&mut self`; exclusive access per device
//! is the caller's concern. Completion and failure events are delivered
//! through a borrowed [`EventSink`], never by calling back into the device;
//! a collaborator that needs to reconfigure does so from its own context
//! after the sink call returns.

use embedded_hal::blocking::delay::DelayUs;

use crate::access::{self, rmw, wait_bits, RegisterBus};
use crate::channel::{GtState, LaneParams, Quad};
use crate::clkdet;
use crate::config::{Bpc, ChannelId, DataWidth, DeviceConfig, Direction, GtType, PllType, Protocol};
use crate::constants::*;
use crate::errors::*;
use crate::mmcm;
use crate::pll;
use crate::registers::*;

/// Receiver of asynchronous PHY events.
///
/// Delivered from [`GtPhy::handle_interrupt`] and the synchronous failure
/// paths. An init request means the reference clock changed and the
/// collaborator must re-issue its configuration request; ready carries the
/// line rate the direction settled at.
pub trait EventSink {
    fn tx_init_request(&mut self);
    fn tx_ready(&mut self, line_rate_hz: u64);
    fn rx_init_request(&mut self);
    fn rx_ready(&mut self, line_rate_hz: u64);
    fn error_notify(&mut self, error: Error);
}

/// Loopback mode for a lane
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Loopback {
    Off,
    NearPcs,
    NearPma,
    FarPma,
    FarPcs,
}

impl Loopback {
    fn code(self) -> u32 {
        match self {
            Loopback::Off => 0b000,
            Loopback::NearPcs => 0b001,
            Loopback::NearPma => 0b010,
            Loopback::FarPma => 0b100,
            Loopback::FarPcs => 0b110,
        }
    }
}

/// TX bring-up step between reset-done and ready.
///
/// The hardware generations genuinely differ here; whether that reflects
/// deliberate design or incomplete unification is not known, so the
/// divergence is kept as an explicit per-type table rather than a single
/// canonical sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TxSequence {
    /// Reset-done starts TX bit alignment; ready on align-done
    Align,
    /// Reset-done waits for the serving PLL's lock interrupt
    LockWait,
    /// Reset-done is ready; no alignment on this generation
    Direct,
}

fn tx_sequence(gt: GtType) -> TxSequence {
    match gt {
        GtType::Gtxe2 | GtType::Gthe3 => TxSequence::Align,
        GtType::Gthe4 => TxSequence::Direct,
        GtType::Gtpe2 => TxSequence::LockWait,
    }
}

/// Reset/lock-status bit group serving a PLL selection
fn pll_mask(pll: PllType) -> u32 {
    match pll {
        PllType::Cpll => PLL_CPLL_MASK,
        PllType::Qpll | PllType::Qpll0 | PllType::Pll0 => PLL_CMN0_MASK,
        PllType::Qpll1 | PllType::Pll1 => PLL_CMN1_MASK,
    }
}

/// `TxSysClkSel`/`RxSysClkSel` encoding for a PLL selection
fn sysclk_code(pll: PllType) -> u8 {
    match pll {
        PllType::Cpll => 0,
        PllType::Qpll | PllType::Qpll0 | PllType::Pll0 => 1,
        PllType::Qpll1 | PllType::Pll1 => 2,
    }
}

/// Transceiver PHY device
pub struct GtPhy<B, D> {
    pub(crate) bus: B,
    pub(crate) delay: D,
    pub(crate) cfg: DeviceConfig,
    pub(crate) quads: [Quad; MAX_QUADS],
}

impl<B, D> GtPhy<B, D>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    /// Create the device over a validated configuration, program the
    /// reference-clock selections, and start the clock detector.
    pub fn new(bus: B, delay: D, cfg: DeviceConfig) -> Result<Self, Error> {
        cfg.validate()?;
        let mut phy = GtPhy {
            bus,
            delay,
            cfg,
            quads: [Quad::default(); MAX_QUADS],
        };
        for q in 0..cfg.quads {
            let base = quad_base(q);
            phy.program_refclk_sel(base)?;
            clkdet::enable(&mut phy.bus, base)?;
        }
        Ok(phy)
    }

    /// Core version register
    pub fn version(&mut self) -> Result<u32, Error> {
        self.bus.read(VERSION)
    }

    /// Device configuration (immutable after construction)
    pub fn config(&self) -> &DeviceConfig {
        &self.cfg
    }

    /// PLL serving a direction
    pub fn pll_type(&self, dir: Direction) -> PllType {
        self.cfg.pll(dir)
    }

    pub(crate) fn check_quad(&self, quad: u8) -> Result<u32, Error> {
        if quad >= self.cfg.quads {
            return Err(Error::InvalidParam);
        }
        Ok(quad_base(quad))
    }

    fn program_refclk_sel(&mut self, base: u32) -> Result<(), Error> {
        let cfg = &self.cfg;
        let mut r = Reg::<RefClkSelReg>::default()
            .set(TxSysClkSel(sysclk_code(cfg.tx_pll)))
            .set(RxSysClkSel(sysclk_code(cfg.rx_pll)));
        for &dir in &[Direction::Tx, Direction::Rx] {
            let code = cfg.refclk_sel(dir).code();
            r = match pll_mask(cfg.pll(dir)) {
                PLL_CPLL_MASK => r.set(CpllRefClkSel(code as u8)),
                PLL_CMN0_MASK => r.set(Cmn0RefClkSel(code as u8)),
                _ => r.set(Cmn1RefClkSel(code as u8)),
            };
        }
        self.bus.write(base + REF_CLK_SEL, r.w)
    }

    // -----------------------------------------------------------------
    // Configuration entry points
    // -----------------------------------------------------------------

    /// Configure a direction of a quad for a serial line rate.
    ///
    /// Synchronous part of the bring-up: evaluates the detected reference
    /// clock (or `refclk_override` when the detector has not settled yet),
    /// computes and commits divisors, asserts and releases the resets, and
    /// leaves the direction in `Reset` awaiting the completion interrupts.
    /// When the reference is below the type's minimum, RX falls back to the
    /// recovery unit if fitted; otherwise the request fails and, when
    /// enabled, the error-notification bit is raised.
    pub fn configure_line_rate(
        &mut self,
        quad: u8,
        dir: Direction,
        line_rate_hz: u64,
        refclk_override: Option<u64>,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        if self.cfg.protocol(dir) == Protocol::None {
            return Err(Error::InvalidParam);
        }

        let measured = match refclk_override {
            Some(hz) => clkdet::round_freq_hz(hz),
            None => clkdet::measured_refclk_hz(&mut self.bus, base, dir)?,
        };

        let mut rate = line_rate_hz;
        let mut width = self.cfg.data_width;
        let mut pll_refclk = measured;
        let mut dru = false;
        if measured < clkdet::min_pll_refclk_hz(self.cfg.gt) {
            if dir == Direction::Rx && self.cfg.dru_present {
                // Degraded-rate recovery: fixed line rate, narrowed
                // datapath, PLL runs from the dedicated DRU reference.
                rate = DRU_LINE_RATE_HZ;
                width = DataWidth::W20;
                pll_refclk = self.cfg.dru_refclk_hz;
                dru = true;
            } else {
                self.raise_err_irq(base, ERR_IRQ_NO_RECOVERY_MASK)?;
                sink.error_notify(Error::NoRecoveryPath);
                return Err(Error::NoRecoveryPath);
            }
        }

        let gt = self.cfg.gt;
        let pllsel = self.cfg.pll(dir);
        // Compute before any mutation: a calculation failure must leave
        // previously committed parameters untouched.
        let div = pll::calc_divisors(gt, pllsel, pll_refclk, rate)?;

        self.quads[quad as usize].requested_rate_hz[dir.idx()] = line_rate_hz;

        let lanes = self.cfg.channels(dir);
        let prst = pll_mask(pllsel);
        rmw(&mut self.bus, base + PLL_RESET, prst, true)?;
        for lane in 0..lanes {
            rmw(&mut self.bus, base + init_ctrl(dir), init_gt_reset(lane), true)?;
            rmw(&mut self.bus, base + init_ctrl(dir), init_userrdy(lane), false)?;
            if dir == Direction::Rx {
                clkdet::set_reset(&mut self.bus, base, lane, true)?;
            }
        }

        for lane in 0..lanes {
            let ch = ChannelId::from_lane(lane)?;
            pll::program_divisors(&mut self.bus, &mut self.delay, base, gt, ch, dir == Direction::Tx, &div)?;
            if dir == Direction::Rx {
                pll::configure_rx_cdr(&mut self.bus, &mut self.delay, base, gt, ch, &div, dru)?;
                if dru {
                    let cfreq = clkdet::center_freq_code(gt, pllsel, measured, &div, self.cfg.dru_refclk_hz);
                    clkdet::program(&mut self.bus, &mut self.delay, base, lane, cfreq)?;
                } else {
                    clkdet::disable(&mut self.bus, base, lane)?;
                }
            }
        }

        rmw(&mut self.bus, base + PLL_RESET, prst, false)?;
        for lane in 0..lanes {
            rmw(&mut self.bus, base + init_ctrl(dir), init_gt_reset(lane), false)?;
            rmw(&mut self.bus, base + init_ctrl(dir), init_userrdy(lane), true)?;
        }

        let q = &mut self.quads[quad as usize];
        for chan in q.channels.iter_mut().take(lanes) {
            chan.params[dir.idx()] = LaneParams {
                line_rate_hz: rate,
                divisors: div,
                refclk_hz: pll_refclk,
                data_width: Some(width),
            };
            if dir == Direction::Rx {
                chan.dru_active = dru;
            }
        }
        q.set_all_states(dir, lanes, GtState::Reset);

        clkdet::arm_timer(&mut self.bus, base, dir, self.cfg.sys_clk_hz, TMR_TIMEOUT_MS)
    }

    /// Reprogram a direction's user-clock generator for a video format.
    ///
    /// On a format the generator cannot realize, fails synchronously with
    /// [`Error::FormatNotSupported`] and raises the error-notification bit.
    pub fn set_format(
        &mut self,
        quad: u8,
        dir: Direction,
        pixel_clk_hz: u64,
        bpc: Bpc,
        sample_rate: u8,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lane0 = &self.quads[quad as usize].channels[0];
        let p = lane0.params(dir);
        let width = p.data_width.unwrap_or(self.cfg.data_width);
        let params = match mmcm::calc_mmcm(pixel_clk_hz, self.cfg.ppc, bpc, sample_rate, p.line_rate_hz, width)
        {
            Ok(p) => p,
            Err(e) => {
                if e == Error::FormatNotSupported {
                    self.raise_err_irq(base, ERR_IRQ_FORMAT_MASK)?;
                    sink.error_notify(e);
                }
                return Err(e);
            }
        };
        mmcm::program_mmcm(&mut self.bus, &mut self.delay, base, dir, &params)?;
        self.quads[quad as usize].mmcm[dir.idx()] = Some(params);
        Ok(())
    }

    fn raise_err_irq(&mut self, base: u32, mask: u32) -> Result<(), Error> {
        if self.cfg.err_irq_en {
            self.bus.write(base + ERR_IRQ, mask)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // State machine (driven from the event dispatcher)
    // -----------------------------------------------------------------

    pub(crate) fn on_reset_done(
        &mut self,
        quad: u8,
        dir: Direction,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lanes = self.cfg.channels(dir);
        if !self.quads[quad as usize].all_in_state(dir, lanes, GtState::Reset) {
            return Ok(());
        }
        match dir {
            Direction::Tx => match tx_sequence(self.cfg.gt) {
                TxSequence::Align => {
                    for lane in 0..lanes {
                        rmw(&mut self.bus, base + TX_INIT, init_phalign_req(lane), true)?;
                    }
                    self.quads[quad as usize].set_all_states(dir, lanes, GtState::Align);
                    clkdet::arm_timer(&mut self.bus, base, dir, self.cfg.sys_clk_hz, ALIGN_TIMEOUT_MS)
                }
                TxSequence::LockWait => {
                    self.quads[quad as usize].set_all_states(dir, lanes, GtState::Lock);
                    Ok(())
                }
                TxSequence::Direct => self.ready(quad, dir, sink),
            },
            Direction::Rx => {
                for lane in 0..lanes {
                    if self.quads[quad as usize].channels[lane].dru_active {
                        clkdet::set_reset(&mut self.bus, base, lane, false)?;
                    }
                }
                self.ready(quad, dir, sink)
            }
        }
    }

    pub(crate) fn on_align_done(
        &mut self,
        quad: u8,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lanes = self.cfg.channels(Direction::Tx);
        if !self.quads[quad as usize].all_in_state(Direction::Tx, lanes, GtState::Align) {
            return Ok(());
        }
        for lane in 0..lanes {
            rmw(&mut self.bus, base + TX_INIT, init_phalign_req(lane), false)?;
        }
        self.ready(quad, Direction::Tx, sink)
    }

    pub(crate) fn on_pll_lock(
        &mut self,
        quad: u8,
        group: u32,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        self.check_quad(quad)?;
        for &dir in &[Direction::Tx, Direction::Rx] {
            let lanes = self.cfg.channels(dir);
            if pll_mask(self.cfg.pll(dir)) == group
                && self.quads[quad as usize].all_in_state(dir, lanes, GtState::Lock)
            {
                self.ready(quad, dir, sink)?;
            }
        }
        Ok(())
    }

    fn ready(&mut self, quad: u8, dir: Direction, sink: &mut dyn EventSink) -> Result<(), Error> {
        let base = quad_base(quad);
        let lanes = self.cfg.channels(dir);
        clkdet::clear_timer(&mut self.bus, base, dir)?;
        let q = &mut self.quads[quad as usize];
        q.set_all_states(dir, lanes, GtState::Ready);
        let rate = q.channels[0].params(dir).line_rate_hz;
        match dir {
            Direction::Tx => sink.tx_ready(rate),
            Direction::Rx => sink.rx_ready(rate),
        }
        Ok(())
    }

    /// Reference-clock frequency change: force the direction to `Idle` from
    /// any state, power the generator down, clear alignment, restart the
    /// measurement window, and re-arm the watchdog. When the new frequency
    /// is usable (natively or through the recovery unit) the collaborator is
    /// asked to reconfigure.
    pub(crate) fn on_freq_change(
        &mut self,
        quad: u8,
        dir: Direction,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lanes = self.cfg.channels(dir);
        self.quads[quad as usize].set_all_states(dir, lanes, GtState::Idle);
        mmcm::disable_mmcm(&mut self.bus, base, dir)?;
        if dir == Direction::Tx {
            for lane in 0..lanes {
                rmw(&mut self.bus, base + TX_INIT, init_phalign_req(lane), false)?;
            }
        }
        clkdet::reset_freq(&mut self.bus, base, dir)?;
        clkdet::arm_timer(&mut self.bus, base, dir, self.cfg.sys_clk_hz, TMR_TIMEOUT_MS)?;

        let hz = clkdet::measured_refclk_hz(&mut self.bus, base, dir)?;
        let usable = hz >= clkdet::min_pll_refclk_hz(self.cfg.gt)
            || (dir == Direction::Rx && self.cfg.dru_present && hz > 0);
        if usable {
            match dir {
                Direction::Tx => sink.tx_init_request(),
                Direction::Rx => sink.rx_init_request(),
            }
        }
        Ok(())
    }

    /// Watchdog expiry: a direction stalled short of `Ready`; replay the
    /// last requested configuration for it.
    pub(crate) fn on_tmr_timeout(
        &mut self,
        quad: u8,
        dir: Direction,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        self.check_quad(quad)?;
        let lanes = self.cfg.channels(dir);
        if self.quads[quad as usize].all_in_state(dir, lanes, GtState::Ready) {
            return Ok(());
        }
        let rate = self.quads[quad as usize].requested_rate_hz[dir.idx()];
        if rate == 0 {
            return Ok(());
        }
        self.configure_line_rate(quad, dir, rate, None, sink)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Committed line rate of a lane/direction, Hz (zero before the first
    /// successful configuration)
    pub fn line_rate(&self, quad: u8, ch: ChannelId, dir: Direction) -> Result<u64, Error> {
        self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        Ok(self.quads[quad as usize].channels[lane].params(dir).line_rate_hz)
    }

    /// Bring-up state of a lane/direction
    pub fn gt_state(&self, quad: u8, ch: ChannelId, dir: Direction) -> Result<GtState, Error> {
        self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        Ok(self.quads[quad as usize].channels[lane].state(dir))
    }

    /// Whether a lane's RX stream is re-timed by the recovery unit
    pub fn dru_active(&self, quad: u8, ch: ChannelId) -> Result<bool, Error> {
        self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        Ok(self.quads[quad as usize].channels[lane].dru_active)
    }

    /// Detected reference clock for a direction, rounded, Hz
    pub fn detected_refclk(&mut self, quad: u8, dir: Direction) -> Result<u64, Error> {
        let base = self.check_quad(quad)?;
        clkdet::measured_refclk_hz(&mut self.bus, base, dir)
    }

    /// Single lock-status poll of a PLL; `WouldBlock` until locked
    pub fn poll_pll_lock(&mut self, quad: u8, pll: PllType) -> nb::Result<(), Error> {
        let base = self.check_quad(quad)?;
        let v = self.bus.read(base + PLL_LOCK_STATUS)?;
        if v & pll_mask(pll) != 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Bounded blocking wait for a PLL's lock
    pub fn wait_pll_lock(&mut self, quad: u8, pll: PllType) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        wait_bits(
            &mut self.bus,
            &mut self.delay,
            base + PLL_LOCK_STATUS,
            pll_mask(pll),
            true,
        )
        .map(|_| ())
    }

    // -----------------------------------------------------------------
    // Buffer / lane auxiliary controls
    // -----------------------------------------------------------------

    /// Enable/disable the RX differential input buffers
    pub fn set_rx_ibufds(&mut self, quad: u8, enable: bool) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        rmw(&mut self.bus, base + IBUFDS_CTRL, IBUFDS_RX_EN_MASK, enable)
    }

    /// Enable/disable the TX differential output drivers
    pub fn set_tx_obufds(&mut self, quad: u8, enable: bool) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        rmw(&mut self.bus, base + IBUFDS_CTRL, IBUFDS_TX_EN_MASK, enable)
    }

    /// Select a lane's loopback mode
    pub fn set_loopback(&mut self, quad: u8, ch: ChannelId, mode: Loopback) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        let v = self.bus.read(base + LOOPBACK_CTRL)?;
        let shift = loopback_shift(lane);
        let v = (v & !(0b111 << shift)) | (mode.code() << shift);
        self.bus.write(base + LOOPBACK_CTRL, v)
    }

    /// Invert a lane's differential pair for a direction
    pub fn set_polarity(
        &mut self,
        quad: u8,
        ch: ChannelId,
        dir: Direction,
        invert: bool,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        let mask = match dir {
            Direction::Tx => polarity_tx(lane),
            Direction::Rx => polarity_rx(lane),
        };
        rmw(&mut self.bus, base + POLARITY_CTRL, mask, invert)
    }

    /// Power a lane's direction down/up
    pub fn set_power_down(
        &mut self,
        quad: u8,
        ch: ChannelId,
        dir: Direction,
        down: bool,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let lane = ch.lane().ok_or(Error::InvalidParam)?;
        let mask = match dir {
            Direction::Tx => powerdown_tx(lane),
            Direction::Rx => powerdown_rx(lane),
        };
        rmw(&mut self.bus, base + POWERDOWN_CTRL, mask, down)
    }

    /// Read one per-lane analog parameter (diagnostics)
    pub fn read_param(&mut self, quad: u8, ch: ChannelId, addr: u16) -> Result<u16, Error> {
        let base = self.check_quad(quad)?;
        access::drp_read(&mut self.bus, &mut self.delay, base, self.cfg.gt, ch, addr)
    }
}

#[inline]
fn quad_base(quad: u8) -> u32 {
    quad as u32 * QUAD_STRIDE
}
