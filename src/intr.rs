//! Event dispatcher
//!
//! Interrupt handling is two-phase. The platform's interrupt entry (top
//! half) calls [`GtPhy::intr_disable`] for the device and defers; a deferred
//! context outside interrupt scope calls [`GtPhy::handle_interrupt`] (the
//! bottom half), which may poll the indirect register protocol for
//! milliseconds.
//!
//! The bottom half reads the pending word once and walks the sources in a
//! fixed order. Around each pending source it masks that class, acknowledges
//! the status bit, runs the state-machine handler, and unmasks the class
//! again, so a handler never observes its own class re-raised mid-run.
//! Handler failures are reported through the sink and do not stop dispatch
//! of the remaining sources.

use embedded_hal::blocking::delay::DelayUs;

use crate::access::RegisterBus;
use crate::config::Direction;
use crate::device::{EventSink, GtPhy};
use crate::errors::*;
use crate::registers::*;

/// Dispatch order. Completions are handled before frequency changes so a
/// bring-up that races a cable pull settles into the state the frequency
/// change then tears down; watchdogs run last.
const DISPATCH_ORDER: [Intr; 10] = [
    Intr::TX_RESET_DONE,
    Intr::RX_RESET_DONE,
    Intr::CPLL_LOCK,
    Intr::CMN0_LOCK,
    Intr::CMN1_LOCK,
    Intr::TX_ALIGN_DONE,
    Intr::TX_FREQ_CHANGE,
    Intr::RX_FREQ_CHANGE,
    Intr::TX_TMR_TIMEOUT,
    Intr::RX_TMR_TIMEOUT,
];

impl<B, D> GtPhy<B, D>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    /// Enable interrupt sources for a quad
    pub fn intr_enable(&mut self, quad: u8, mask: Intr) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        self.bus.write(base + INTR_EN, mask.bits())
    }

    /// Disable (mask) interrupt sources for a quad. Safe from interrupt
    /// context; performs a single register write.
    pub fn intr_disable(&mut self, quad: u8, mask: Intr) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        self.bus.write(base + INTR_DIS, mask.bits())
    }

    /// Service every pending interrupt source of a quad.
    ///
    /// Must run outside interrupt context. Events and handler failures are
    /// delivered through `sink`; the returned error covers only faults of
    /// the dispatch machinery itself (bad quad, bus fault on the status
    /// word).
    pub fn handle_interrupt(
        &mut self,
        quad: u8,
        sink: &mut dyn EventSink,
    ) -> Result<(), Error> {
        let base = self.check_quad(quad)?;
        let pending = Intr::from_bits_truncate(self.bus.read(base + INTR_STATUS)?);
        for &class in DISPATCH_ORDER.iter() {
            if !pending.contains(class) {
                continue;
            }
            self.bus.write(base + INTR_DIS, class.bits())?;
            self.bus.write(base + INTR_STATUS, class.bits())?;
            let r = self.dispatch(quad, class, sink);
            self.bus.write(base + INTR_EN, class.bits())?;
            if let Err(e) = r {
                sink.error_notify(e);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, quad: u8, class: Intr, sink: &mut dyn EventSink) -> Result<(), Error> {
        if class == Intr::TX_RESET_DONE {
            self.on_reset_done(quad, Direction::Tx, sink)
        } else if class == Intr::RX_RESET_DONE {
            self.on_reset_done(quad, Direction::Rx, sink)
        } else if class == Intr::CPLL_LOCK {
            self.on_pll_lock(quad, PLL_CPLL_MASK, sink)
        } else if class == Intr::CMN0_LOCK {
            self.on_pll_lock(quad, PLL_CMN0_MASK, sink)
        } else if class == Intr::CMN1_LOCK {
            self.on_pll_lock(quad, PLL_CMN1_MASK, sink)
        } else if class == Intr::TX_ALIGN_DONE {
            self.on_align_done(quad, sink)
        } else if class == Intr::TX_FREQ_CHANGE {
            self.on_freq_change(quad, Direction::Tx, sink)
        } else if class == Intr::RX_FREQ_CHANGE {
            self.on_freq_change(quad, Direction::Rx, sink)
        } else if class == Intr::TX_TMR_TIMEOUT {
            self.on_tmr_timeout(quad, Direction::Tx, sink)
        } else if class == Intr::RX_TMR_TIMEOUT {
            self.on_tmr_timeout(quad, Direction::Rx, sink)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::test_support::{Event, FakeBus, NoDelay, RecordingSink};

    fn cfg() -> DeviceConfig {
        DeviceConfig {
            gt: GtType::Gthe3,
            tx_channels: 2,
            rx_channels: 2,
            tx_protocol: Protocol::Hdmi,
            rx_protocol: Protocol::Hdmi,
            tx_pll: PllType::Cpll,
            rx_pll: PllType::Qpll0,
            tx_refclk_sel: RefClkSel::Ref0,
            rx_refclk_sel: RefClkSel::Ref1,
            ppc: Ppc::Two,
            data_width: DataWidth::W40,
            dru_present: false,
            dru_refclk_hz: 0,
            err_irq_en: false,
            sys_clk_hz: 100_000_000,
            quads: 1,
        }
    }

    fn phy() -> GtPhy<FakeBus, NoDelay> {
        GtPhy::new(FakeBus::new(), NoDelay, cfg()).unwrap()
    }

    #[test]
    fn enable_and_disable_update_mask() {
        let mut phy = phy();
        phy.intr_disable(0, Intr::TX_RESET_DONE | Intr::RX_RESET_DONE).unwrap();
        assert!(phy.bus.intr_mask(0).contains(Intr::TX_RESET_DONE));
        phy.intr_enable(0, Intr::TX_RESET_DONE).unwrap();
        assert!(!phy.bus.intr_mask(0).contains(Intr::TX_RESET_DONE));
        assert!(phy.bus.intr_mask(0).contains(Intr::RX_RESET_DONE));
    }

    #[test]
    fn dispatch_acks_and_restores_mask() {
        let mut phy = phy();
        let mut sink = RecordingSink::new();
        phy.bus.poke(CLKDET_FREQ_TX, 148_500_000);
        phy.configure_line_rate(0, Direction::Tx, 1_485_000_000, None, &mut sink)
            .unwrap();

        phy.bus.raise_intr(0, Intr::TX_RESET_DONE);
        phy.handle_interrupt(0, &mut sink).unwrap();

        // Acked and re-enabled after the handler ran.
        assert!(phy.bus.intr_status(0).is_empty());
        assert!(!phy.bus.intr_mask(0).contains(Intr::TX_RESET_DONE));

        // The class was masked before any handler write and unmasked after
        // the last one.
        let writes = &phy.bus.writes;
        let dis = writes
            .iter()
            .position(|&(o, v)| o == INTR_DIS && v == Intr::TX_RESET_DONE.bits())
            .unwrap();
        let en = writes
            .iter()
            .rposition(|&(o, v)| o == INTR_EN && v == Intr::TX_RESET_DONE.bits())
            .unwrap();
        assert!(dis < en);
        assert_eq!(writes.last().unwrap().0, INTR_EN);
    }

    #[test]
    fn unconfigured_source_is_acked_without_effect() {
        let mut phy = phy();
        let mut sink = RecordingSink::new();
        // Align-done with no lane in Align: handler gates on state and does
        // nothing, but the bit must still be cleared.
        phy.bus.raise_intr(0, Intr::TX_ALIGN_DONE);
        phy.handle_interrupt(0, &mut sink).unwrap();
        assert!(phy.bus.intr_status(0).is_empty());
        assert!(sink.events.is_empty());
    }

    #[test]
    fn handler_failure_reaches_sink_and_dispatch_continues() {
        let mut phy = phy();
        let mut sink = RecordingSink::new();
        phy.bus.poke(CLKDET_FREQ_TX, 148_500_000);
        phy.bus.poke(CLKDET_FREQ_RX, 148_500_000);
        phy.configure_line_rate(0, Direction::Tx, 1_485_000_000, None, &mut sink)
            .unwrap();
        sink.events.clear();

        // TX watchdog replays the configuration against a reference that has
        // since dropped to nothing; RX reset-done must still be dispatched.
        phy.bus.poke(CLKDET_FREQ_TX, 0);
        phy.configure_line_rate(0, Direction::Rx, 1_485_000_000, None, &mut sink)
            .unwrap();
        phy.bus.raise_intr(0, Intr::TX_TMR_TIMEOUT | Intr::RX_RESET_DONE);
        phy.handle_interrupt(0, &mut sink).unwrap();

        assert!(sink.contains(Event::Error(Error::NoRecoveryPath)));
        assert!(sink.contains(Event::RxReady(1_485_000_000)));
    }

    #[test]
    fn bad_quad_is_rejected() {
        let mut phy = phy();
        let mut sink = RecordingSink::new();
        assert_eq!(phy.handle_interrupt(5, &mut sink), Err(Error::InvalidParam));
        assert_eq!(phy.intr_enable(5, Intr::all()), Err(Error::InvalidParam));
    }
}
