//! PHY core register block
//!
//! Byte offsets into the memory-mapped control/status window, bit masks for
//! the flat control registers, and typed bitfields for the packed ones
//! (indirect-access control/status, reference-clock select, user-clock
//! generator configuration, DRU gain).
//!
//! Multi-quad cores repeat the whole block at [`QUAD_STRIDE`] intervals.

use core::marker::PhantomData;

use bitflags::bitflags;

use crate::config::Direction;

/// Core version register (read-only; major.minor.rev packed BCD)
pub const VERSION: u32 = 0x0000;

/// Reference clock selection, see [`RefClkSelReg`] fields
pub const REF_CLK_SEL: u32 = 0x0010;

/// PLL reset control
pub const PLL_RESET: u32 = 0x0014;

/// PLL lock status (read-only)
pub const PLL_LOCK_STATUS: u32 = 0x0018;

/// TX initialization control, per-lane bit groups
pub const TX_INIT: u32 = 0x001C;

/// TX initialization status (read-only)
pub const TX_INIT_STATUS: u32 = 0x0020;

/// RX initialization control
pub const RX_INIT: u32 = 0x0024;

/// RX initialization status (read-only)
pub const RX_INIT_STATUS: u32 = 0x0028;

/// Differential buffer control
pub const IBUFDS_CTRL: u32 = 0x002C;

/// Per-lane power-down control
pub const POWERDOWN_CTRL: u32 = 0x0030;

/// Per-lane loopback selection, one 3-bit field per lane
pub const LOOPBACK_CTRL: u32 = 0x0038;

/// Per-lane polarity inversion
pub const POLARITY_CTRL: u32 = 0x003C;

/// Interrupt enable (write-1-to-enable)
pub const INTR_EN: u32 = 0x0140;

/// Interrupt disable (write-1-to-disable)
pub const INTR_DIS: u32 = 0x0144;

/// Interrupt mask (read-only view of disabled sources)
pub const INTR_MASK: u32 = 0x0148;

/// Interrupt status, write-1-to-clear
pub const INTR_STATUS: u32 = 0x014C;

/// Clock detector control
pub const CLKDET_CTRL: u32 = 0x0200;

/// Clock detector status (read-only)
pub const CLKDET_STATUS: u32 = 0x0204;

/// Measured TX reference clock frequency, Hz (read-only)
pub const CLKDET_FREQ_TX: u32 = 0x0208;

/// Measured RX reference clock frequency, Hz (read-only)
pub const CLKDET_FREQ_RX: u32 = 0x020C;

/// TX watchdog timer preload, core clock ticks; counts down once started
pub const CLKDET_TMR_TX: u32 = 0x0210;

/// RX watchdog timer preload
pub const CLKDET_TMR_RX: u32 = 0x0214;

/// DRU global control
pub const DRU_CTRL: u32 = 0x0300;

/// DRU status (read-only)
pub const DRU_STAT: u32 = 0x0304;

/// Error-notification bits toward the host, write-1-to-raise
pub const ERR_IRQ: u32 = 0x03F0;

/// Address stride between quads
pub const QUAD_STRIDE: u32 = 0x0400;

/// Indirect-access control register for a lane (stride 8)
#[inline]
pub fn drp_ctrl(lane: usize) -> u32 {
    0x0040 + 8 * lane as u32
}

/// Indirect-access status register for a lane
#[inline]
pub fn drp_status(lane: usize) -> u32 {
    0x0044 + 8 * lane as u32
}

/// Indirect-access control register for the common (shared PLL) block
pub const DRP_CTRL_COMMON: u32 = 0x0060;

/// Indirect-access status register for the common block
pub const DRP_STATUS_COMMON: u32 = 0x0064;

/// User-clock generator control for a direction (stride 0x10)
#[inline]
pub fn mmcm_ctrl(dir: Direction) -> u32 {
    0x0100 + 0x10 * dir.idx() as u32
}

/// User-clock generator multiply/divide word, see [`MmcmMult`]/[`MmcmDiv`]
#[inline]
pub fn mmcm_cfg0(dir: Direction) -> u32 {
    mmcm_ctrl(dir) + 0x4
}

/// Output divides 0/1, see [`ClkOut0Div`]/[`ClkOut1Div`]
#[inline]
pub fn mmcm_cfg1(dir: Direction) -> u32 {
    mmcm_ctrl(dir) + 0x8
}

/// Output divide 2, see [`ClkOut2Div`]
#[inline]
pub fn mmcm_cfg2(dir: Direction) -> u32 {
    mmcm_ctrl(dir) + 0xC
}

/// Measured reference clock frequency register for a direction
#[inline]
pub fn clkdet_freq(dir: Direction) -> u32 {
    match dir {
        Direction::Tx => CLKDET_FREQ_TX,
        Direction::Rx => CLKDET_FREQ_RX,
    }
}

/// Watchdog timer register for a direction
#[inline]
pub fn clkdet_tmr(dir: Direction) -> u32 {
    match dir {
        Direction::Tx => CLKDET_TMR_TX,
        Direction::Rx => CLKDET_TMR_RX,
    }
}

/// Init control register for a direction
#[inline]
pub fn init_ctrl(dir: Direction) -> u32 {
    match dir {
        Direction::Tx => TX_INIT,
        Direction::Rx => RX_INIT,
    }
}

/// Init status register for a direction
#[inline]
pub fn init_status(dir: Direction) -> u32 {
    match dir {
        Direction::Tx => TX_INIT_STATUS,
        Direction::Rx => RX_INIT_STATUS,
    }
}

/// DRU center frequency low word for a lane (stride 0x10)
#[inline]
pub fn dru_cfreq_l(lane: usize) -> u32 {
    0x0310 + 0x10 * lane as u32
}

/// DRU center frequency high word for a lane
#[inline]
pub fn dru_cfreq_h(lane: usize) -> u32 {
    dru_cfreq_l(lane) + 0x4
}

/// DRU gain word for a lane, see [`DruG1`]/[`DruG1P`]/[`DruG2`]
#[inline]
pub fn dru_gain(lane: usize) -> u32 {
    dru_cfreq_l(lane) + 0x8
}

// ---------------------------------------------------------------------------
// Flat register bits
// ---------------------------------------------------------------------------

/// `PLL_RESET` / `PLL_LOCK_STATUS`: channel PLL (all lanes ANDed)
pub const PLL_CPLL_MASK: u32 = 1 << 0;
/// `PLL_RESET` / `PLL_LOCK_STATUS`: common PLL 0 (QPLL/QPLL0/PLL0)
pub const PLL_CMN0_MASK: u32 = 1 << 1;
/// `PLL_RESET` / `PLL_LOCK_STATUS`: common PLL 1 (QPLL1/PLL1)
pub const PLL_CMN1_MASK: u32 = 1 << 2;

/// `TX_INIT`/`RX_INIT`: GT reset request, lane bit
#[inline]
pub fn init_gt_reset(lane: usize) -> u32 {
    1 << lane
}

/// `TX_INIT`/`RX_INIT`: user-ready, lane bit
#[inline]
pub fn init_userrdy(lane: usize) -> u32 {
    1 << (8 + lane)
}

/// `TX_INIT`: phase-alignment request, lane bit
#[inline]
pub fn init_phalign_req(lane: usize) -> u32 {
    1 << (16 + lane)
}

/// `TX_INIT_STATUS`/`RX_INIT_STATUS`: reset done, lane bit
#[inline]
pub fn status_reset_done(lane: usize) -> u32 {
    1 << lane
}

/// `TX_INIT_STATUS`: alignment done, lane bit
#[inline]
pub fn status_align_done(lane: usize) -> u32 {
    1 << (8 + lane)
}

/// `IBUFDS_CTRL`: RX differential input buffer enable
pub const IBUFDS_RX_EN_MASK: u32 = 1 << 0;
/// `IBUFDS_CTRL`: TX differential output driver enable
pub const IBUFDS_TX_EN_MASK: u32 = 1 << 1;

/// `POWERDOWN_CTRL`: TX lane power-down bit
#[inline]
pub fn powerdown_tx(lane: usize) -> u32 {
    1 << lane
}

/// `POWERDOWN_CTRL`: RX lane power-down bit
#[inline]
pub fn powerdown_rx(lane: usize) -> u32 {
    1 << (8 + lane)
}

/// `POLARITY_CTRL`: TX diff-pair inversion bit
#[inline]
pub fn polarity_tx(lane: usize) -> u32 {
    1 << lane
}

/// `POLARITY_CTRL`: RX diff-pair inversion bit
#[inline]
pub fn polarity_rx(lane: usize) -> u32 {
    1 << (8 + lane)
}

/// `LOOPBACK_CTRL`: shift of a lane's 3-bit loopback field
#[inline]
pub fn loopback_shift(lane: usize) -> u32 {
    4 * lane as u32
}

/// `CLKDET_CTRL`: run enable
pub const CLKDET_RUN_MASK: u32 = 1 << 0;
/// `CLKDET_CTRL`: clear TX watchdog (self-clearing)
pub const CLKDET_TX_TMR_CLR_MASK: u32 = 1 << 1;
/// `CLKDET_CTRL`: clear RX watchdog (self-clearing)
pub const CLKDET_RX_TMR_CLR_MASK: u32 = 1 << 2;
/// `CLKDET_CTRL`: reset TX frequency measurement (self-clearing)
pub const CLKDET_TX_FREQ_RST_MASK: u32 = 1 << 3;
/// `CLKDET_CTRL`: reset RX frequency measurement (self-clearing)
pub const CLKDET_RX_FREQ_RST_MASK: u32 = 1 << 4;

/// `MMCM_*_CTRL`: latch the CFG registers into the generator (self-clearing)
pub const MMCM_CFG_NEW_MASK: u32 = 1 << 0;
/// `MMCM_*_CTRL`: generator reset
pub const MMCM_RST_MASK: u32 = 1 << 1;
/// `MMCM_*_CTRL`: generator power-down
pub const MMCM_PWRDWN_MASK: u32 = 1 << 2;
/// `MMCM_*_CTRL`: generator locked (read-only)
pub const MMCM_LOCKED_MASK: u32 = 1 << 31;

/// `DRU_CTRL`: lane DRU reset bit
#[inline]
pub fn dru_rst(lane: usize) -> u32 {
    1 << lane
}

/// `DRU_CTRL`: lane DRU enable bit
#[inline]
pub fn dru_en(lane: usize) -> u32 {
    1 << (8 + lane)
}

/// `DRP_STATUS_*`: access in progress
pub const DRP_BUSY_MASK: u32 = 1 << 17;
/// `DRP_STATUS_*`: access complete, read data valid
pub const DRP_READY_MASK: u32 = 1 << 16;

/// `ERR_IRQ`: requested format exceeds generator/protocol limits
pub const ERR_IRQ_FORMAT_MASK: u32 = 1 << 0;
/// `ERR_IRQ`: reference clock unusable and no recovery unit fitted
pub const ERR_IRQ_NO_RECOVERY_MASK: u32 = 1 << 1;

bitflags! {
    /// Interrupt sources (`INTR_EN`/`INTR_DIS`/`INTR_MASK`/`INTR_STATUS`)
    pub struct Intr: u32 {
        const TX_RESET_DONE   = 0x0000_0001;
        const RX_RESET_DONE   = 0x0000_0002;
        const CPLL_LOCK       = 0x0000_0004;
        const CMN0_LOCK       = 0x0000_0008;
        const TX_ALIGN_DONE   = 0x0000_0010;
        const CMN1_LOCK       = 0x0000_0020;
        const TX_FREQ_CHANGE  = 0x0000_0200;
        const RX_FREQ_CHANGE  = 0x0000_0400;
        const TX_TMR_TIMEOUT  = 0x4000_0000;
        const RX_TMR_TIMEOUT  = 0x8000_0000;
    }
}

// ---------------------------------------------------------------------------
// Packed registers
// ---------------------------------------------------------------------------

/// Register marker types
macro_rules! gen_register_marker {
    ($(#[$meta:meta])* $r:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone)]
        pub struct $r {}

        impl Default for Reg<$r> {
            #[inline]
            fn default() -> Self {
                Reg { w: 0, phantom: PhantomData }
            }
        }
    };
}

gen_register_marker!(
    /// Indirect-access control word marker
    DrpCtrlReg
);
gen_register_marker!(
    /// Indirect-access status word marker
    DrpStatusReg
);
gen_register_marker!(
    /// Reference-clock select word marker
    RefClkSelReg
);
gen_register_marker!(
    /// User-clock generator multiply/divide word marker
    MmcmCfg0Reg
);
gen_register_marker!(
    /// User-clock generator output divide 0/1 word marker
    MmcmCfg1Reg
);
gen_register_marker!(
    /// User-clock generator output divide 2 word marker
    MmcmCfg2Reg
);
gen_register_marker!(
    /// DRU gain word marker
    DruGainReg
);

/// Single packed register word
#[derive(Debug, Copy, Clone)]
pub struct Reg<R> {
    /// Register word
    pub w: u32,
    phantom: PhantomData<R>,
}

impl<R> Reg<R> {
    /// Wrap a word read back from hardware
    #[inline]
    pub fn from_word(w: u32) -> Self {
        Reg { w, phantom: PhantomData }
    }

    #[inline]
    pub fn get<F>(&self) -> F
    where
        F: Sized + BitField<R> + From<u32>,
    {
        F::from((self.w >> F::offset()) & F::mask())
    }

    #[inline]
    pub fn set<F>(mut self, f: F) -> Self
    where
        F: Sized + BitField<R> + Into<u32>,
    {
        let fbits = (f.into() & F::mask()) << F::offset();
        let rbits = self.w & !(F::mask() << F::offset());
        self.w = rbits | fbits;
        self
    }
}

/// Bit operations on 32bit words
pub trait BitField<R> {
    /// Number of bits in the bit field
    fn num_bits() -> u8;

    /// Offset from 0
    fn offset() -> u8;

    #[inline]
    fn mask() -> u32 {
        !(0xFFFF_FFFFu32 << Self::num_bits())
    }
}

/// Generate BitField implementation
macro_rules! gen_bitfield_impl {
    ($r:ty, $n:ident, $nb:tt, $off:tt) => {
        impl BitField<$r> for $n {
            #[inline]
            fn num_bits() -> u8 {
                $nb
            }
            #[inline]
            fn offset() -> u8 {
                $off
            }
        }
    };
}

/// Small bitfield-encoded numbers boilerplate
macro_rules! gen_bitfield_struct {
    ($(#[$meta:meta])*, $r:ty, $n:ident, $v:ty, $nb:tt, $off:tt) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub struct $n(pub $v);

        gen_bitfield_impl!($r, $n, $nb, $off);

        impl From<u32> for $n {
            #[inline]
            fn from(x: u32) -> Self {
                $n(x as $v)
            }
        }
        impl Into<u32> for $n {
            #[inline]
            fn into(self) -> u32 {
                self.0 as u32
            }
        }
    };
}

/// Single-bit enable/disable fields
macro_rules! gen_bitfield_flag {
    ($(#[$meta:meta])* $r:ty, $n:ident, $off:tt) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum $n {
            Disabled,
            Enabled,
        }

        gen_bitfield_impl!($r, $n, 1, $off);

        impl From<u32> for $n {
            #[inline]
            fn from(x: u32) -> Self {
                if x & 1 == 0 {
                    $n::Disabled
                } else {
                    $n::Enabled
                }
            }
        }
        impl Into<u32> for $n {
            #[inline]
            fn into(self) -> u32 {
                self as u32
            }
        }
    };
}

gen_bitfield_struct!(
    /// Indirect parameter address within the lane's analog parameter space
    , DrpCtrlReg, DrpAddr, u16, 10, 0
);

gen_bitfield_flag!(
    /// Write (rather than read) access
    DrpCtrlReg, DrpWe, 12
);

gen_bitfield_flag!(
    /// Start the access. The core clears the bit and raises
    /// `DRP_READY` in the status register when the parameter
    /// interface has completed.
    DrpCtrlReg, DrpEn, 13
);

gen_bitfield_struct!(
    /// Write data
    , DrpCtrlReg, DrpWData, u16, 16, 16
);

gen_bitfield_struct!(
    /// Read data, valid while `DRP_READY` is set
    , DrpStatusReg, DrpRData, u16, 16, 0
);

gen_bitfield_struct!(
    /// Channel PLL reference input selection (encodings in
    /// [`RefClkSel::code`](crate::config::RefClkSel::code))
    , RefClkSelReg, CpllRefClkSel, u8, 3, 0
);

gen_bitfield_struct!(
    /// Common PLL 0 reference input selection
    , RefClkSelReg, Cmn0RefClkSel, u8, 3, 4
);

gen_bitfield_struct!(
    /// Common PLL 1 reference input selection
    , RefClkSelReg, Cmn1RefClkSel, u8, 3, 8
);

gen_bitfield_struct!(
    /// TX system clock source: 0 = channel PLL, 1 = common PLL 0,
    /// 2 = common PLL 1
    , RefClkSelReg, TxSysClkSel, u8, 2, 16
);

gen_bitfield_struct!(
    /// RX system clock source, same encoding as [`TxSysClkSel`]
    , RefClkSelReg, RxSysClkSel, u8, 2, 18
);

gen_bitfield_struct!(
    /// Generator multiply factor
    , MmcmCfg0Reg, MmcmMult, u16, 8, 0
);

gen_bitfield_struct!(
    /// Generator input divide
    , MmcmCfg0Reg, MmcmDiv, u16, 8, 8
);

gen_bitfield_struct!(
    /// Link clock output divide
    , MmcmCfg1Reg, ClkOut0Div, u16, 8, 0
);

gen_bitfield_struct!(
    /// Stream clock output divide
    , MmcmCfg1Reg, ClkOut1Div, u16, 8, 8
);

gen_bitfield_struct!(
    /// Video clock output divide
    , MmcmCfg2Reg, ClkOut2Div, u16, 8, 0
);

gen_bitfield_struct!(
    /// DRU proportional gain
    , DruGainReg, DruG1, u8, 5, 0
);

gen_bitfield_struct!(
    /// DRU phase gain
    , DruGainReg, DruG1P, u8, 5, 8
);

gen_bitfield_struct!(
    /// DRU integral gain
    , DruGainReg, DruG2, u8, 5, 16
);

// ---------------------------------------------------------------------------
// Per-lane analog parameter (indirect) address map
// ---------------------------------------------------------------------------

/// PLL feedback divider word: N1 in [7:4], N2 in [3:0]
pub const DRP_ADDR_PLL_DIV0: u16 = 0x28;

/// PLL reference divider word: M in [4:0]
pub const DRP_ADDR_PLL_DIV1: u16 = 0x2A;

/// Serial output divider word: TX D in [3:0], RX D in [11:8], encoded
/// log2(D)
pub const DRP_ADDR_OUT_DIV: u16 = 0x88;

/// First of five RX CDR configuration words (consecutive addresses)
pub const DRP_ADDR_RXCDR_CFG0: u16 = 0xA8;

/// RX equalizer configuration word
pub const DRP_ADDR_RX_EQ_CFG: u16 = 0xB0;
