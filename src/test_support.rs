//! Shared test fixtures: an in-memory register file implementing
//! [`RegisterBus`] with enough behavioral modeling of the core (indirect
//! parameter handshake, interrupt enable/disable/mask, write-1-to-clear
//! status) to exercise the driver end to end, plus fault injection for the
//! bounded-poll paths.

use std::collections::HashMap;

use embedded_hal::blocking::delay::DelayUs;

use crate::access::RegisterBus;
use crate::device::EventSink;
use crate::errors::Error;
use crate::registers::*;

/// Delay provider that returns immediately
pub struct NoDelay;

impl DelayUs<u16> for NoDelay {
    fn delay_us(&mut self, _us: u16) {}
}

pub struct FakeBus {
    regs: HashMap<u32, u32>,
    /// Indirect parameter memories, keyed by (control register, address)
    drp_mem: HashMap<(u32, u16), u16>,
    /// Read data latched by the last completed indirect access per port
    drp_rdata: HashMap<u32, u16>,
    reads: HashMap<u32, u32>,
    /// All writes in issue order, for sequencing assertions
    pub writes: Vec<(u32, u32)>,
    /// Report the indirect ports as permanently busy
    pub stuck_busy: bool,
    /// Fail every access with `Error::Bus`
    pub fail: bool,
}

fn is_drp_ctrl(rel: u32) -> bool {
    (0x40..=0x60).contains(&rel) && rel % 8 == 0
}

fn is_drp_status(rel: u32) -> bool {
    (0x44..=0x64).contains(&rel) && rel % 8 == 4
}

impl FakeBus {
    pub fn new() -> Self {
        FakeBus {
            regs: HashMap::new(),
            drp_mem: HashMap::new(),
            drp_rdata: HashMap::new(),
            reads: HashMap::new(),
            writes: Vec::new(),
            stuck_busy: false,
            fail: false,
        }
    }

    /// Set a register value directly (bypassing bus semantics)
    pub fn poke(&mut self, offset: u32, value: u32) {
        self.regs.insert(offset, value);
    }

    /// Read a register value directly
    pub fn peek(&self, offset: u32) -> u32 {
        *self.regs.get(&offset).unwrap_or(&0)
    }

    /// Number of bus reads issued against `offset`
    pub fn read_count(&self, offset: u32) -> u32 {
        *self.reads.get(&offset).unwrap_or(&0)
    }

    /// Raise interrupt status bits as the hardware would
    pub fn raise_intr(&mut self, quad_base: u32, intr: Intr) {
        let off = quad_base + INTR_STATUS;
        let v = self.peek(off) | intr.bits();
        self.poke(off, v);
    }

    /// Pending-interrupt view
    pub fn intr_status(&self, quad_base: u32) -> Intr {
        Intr::from_bits_truncate(self.peek(quad_base + INTR_STATUS))
    }

    /// Disabled-sources view
    pub fn intr_mask(&self, quad_base: u32) -> Intr {
        Intr::from_bits_truncate(self.peek(quad_base + INTR_MASK))
    }

    /// Value stored at (port, address) of an indirect parameter memory
    pub fn drp_value(&self, ctrl_offset: u32, addr: u16) -> u16 {
        *self.drp_mem.get(&(ctrl_offset, addr)).unwrap_or(&0)
    }
}

/// Event delivered to a [`RecordingSink`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    TxInit,
    TxReady(u64),
    RxInit,
    RxReady(u64),
    Error(Error),
}

/// Sink that records every delivered event in order
pub struct RecordingSink {
    pub events: Vec<Event>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink { events: Vec::new() }
    }

    pub fn contains(&self, e: Event) -> bool {
        self.events.contains(&e)
    }
}

impl EventSink for RecordingSink {
    fn tx_init_request(&mut self) {
        self.events.push(Event::TxInit);
    }

    fn tx_ready(&mut self, line_rate_hz: u64) {
        self.events.push(Event::TxReady(line_rate_hz));
    }

    fn rx_init_request(&mut self) {
        self.events.push(Event::RxInit);
    }

    fn rx_ready(&mut self, line_rate_hz: u64) {
        self.events.push(Event::RxReady(line_rate_hz));
    }

    fn error_notify(&mut self, error: Error) {
        self.events.push(Event::Error(error));
    }
}

impl RegisterBus for FakeBus {
    fn read(&mut self, offset: u32) -> Result<u32, Error> {
        *self.reads.entry(offset).or_insert(0) += 1;
        if self.fail {
            return Err(Error::Bus);
        }
        let rel = offset % QUAD_STRIDE;
        if is_drp_status(rel) {
            if self.stuck_busy {
                return Ok(DRP_BUSY_MASK);
            }
            let ctrl = offset - 4;
            let rdata = *self.drp_rdata.get(&ctrl).unwrap_or(&0);
            return Ok(DRP_READY_MASK | rdata as u32);
        }
        Ok(self.peek(offset))
    }

    fn write(&mut self, offset: u32, value: u32) -> Result<(), Error> {
        self.writes.push((offset, value));
        if self.fail {
            return Err(Error::Bus);
        }
        let rel = offset % QUAD_STRIDE;
        let base = offset - rel;
        match rel {
            _ if is_drp_ctrl(rel) => {
                let w = Reg::<DrpCtrlReg>::from_word(value);
                if w.get::<DrpEn>() == DrpEn::Enabled {
                    let addr = w.get::<DrpAddr>().0;
                    if w.get::<DrpWe>() == DrpWe::Enabled {
                        self.drp_mem.insert((offset, addr), w.get::<DrpWData>().0);
                    }
                    let v = self.drp_value(offset, addr);
                    self.drp_rdata.insert(offset, v);
                }
            }
            INTR_EN => {
                let m = self.peek(base + INTR_MASK) & !value;
                self.poke(base + INTR_MASK, m);
            }
            INTR_DIS => {
                let m = self.peek(base + INTR_MASK) | value;
                self.poke(base + INTR_MASK, m);
            }
            INTR_STATUS => {
                // write-1-to-clear
                let v = self.peek(offset) & !value;
                self.poke(offset, v);
            }
            _ => {
                self.poke(offset, value);
            }
        }
        Ok(())
    }
}
