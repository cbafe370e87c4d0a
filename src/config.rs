//! Device configuration
//!
//! One [`DeviceConfig`] is populated by the platform/bus binding before the
//! device is constructed and is immutable afterwards; line-rate and format
//! changes go through the reconfiguration entry points, never through this
//! struct.

use crate::constants::*;
use crate::errors::*;

/// Transceiver type
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GtType {
    /// 7 series GTX
    Gtxe2,
    /// 7 series GTP (no CPLL; two shared PLLs only)
    Gtpe2,
    /// UltraScale GTH
    Gthe3,
    /// UltraScale+ GTH
    Gthe4,
}

/// PLL selection for a direction.
///
/// Which selections exist depends on the transceiver type: GTXE2 provides
/// `Cpll`/`Qpll`, GTHE3/GTHE4 provide `Cpll`/`Qpll0`/`Qpll1`, and GTPE2
/// provides only the shared `Pll0`/`Pll1` pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllType {
    Cpll,
    Qpll,
    Qpll0,
    Qpll1,
    Pll0,
    Pll1,
}

impl PllType {
    /// True for the shared (common-block) PLLs
    pub fn is_common(self) -> bool {
        !matches!(self, PllType::Cpll)
    }

    /// Whether this selection exists on the given transceiver type
    pub fn valid_for(self, gt: GtType) -> bool {
        match gt {
            GtType::Gtxe2 => matches!(self, PllType::Cpll | PllType::Qpll),
            GtType::Gtpe2 => matches!(self, PllType::Pll0 | PllType::Pll1),
            GtType::Gthe3 | GtType::Gthe4 => {
                matches!(self, PllType::Cpll | PllType::Qpll0 | PllType::Qpll1)
            }
        }
    }
}

/// Link direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    /// Index into direction-parallel arrays
    #[inline]
    pub fn idx(self) -> usize {
        match self {
            Direction::Tx => 0,
            Direction::Rx => 1,
        }
    }
}

/// Lane / common-block addressing within a quad
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    /// Shared PLL block 0
    Cmn0,
    /// Shared PLL block 1
    Cmn1,
}

impl ChannelId {
    /// Lane index 0..=3, or `None` for the common blocks
    pub fn lane(self) -> Option<usize> {
        match self {
            ChannelId::Ch1 => Some(0),
            ChannelId::Ch2 => Some(1),
            ChannelId::Ch3 => Some(2),
            ChannelId::Ch4 => Some(3),
            _ => None,
        }
    }

    /// Lane id for lane index 0..=3
    pub fn from_lane(lane: usize) -> Result<Self, Error> {
        match lane {
            0 => Ok(ChannelId::Ch1),
            1 => Ok(ChannelId::Ch2),
            2 => Ok(ChannelId::Ch3),
            3 => Ok(ChannelId::Ch4),
            _ => Err(Error::InvalidParam),
        }
    }
}

/// Protocol bound to a direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Hdmi,
    Sdi,
    /// Direction unused
    None,
}

/// Reference clock input selection
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefClkSel {
    Ref0,
    Ref1,
    Ref2,
}

impl RefClkSel {
    /// Encoding used by the reference-clock select register
    #[inline]
    pub fn code(self) -> u32 {
        match self {
            RefClkSel::Ref0 => 0b001,
            RefClkSel::Ref1 => 0b010,
            RefClkSel::Ref2 => 0b011,
        }
    }
}

/// Pixels per clock of the attached video datapath
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ppc {
    One,
    Two,
    Four,
}

impl Ppc {
    #[inline]
    pub fn factor(self) -> u16 {
        match self {
            Ppc::One => 1,
            Ppc::Two => 2,
            Ppc::Four => 4,
        }
    }
}

/// Colour depth, bits per component
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bpc {
    B8,
    B10,
    B12,
    B16,
}

impl Bpc {
    /// Clock scaling ratio (numerator, denominator) relative to 8 bpc
    #[inline]
    pub fn ratio(self) -> (u16, u16) {
        match self {
            Bpc::B8 => (1, 1),
            Bpc::B10 => (5, 4),
            Bpc::B12 => (3, 2),
            Bpc::B16 => (2, 1),
        }
    }
}

/// Internal datapath width
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataWidth {
    /// 2-byte (20-bit) datapath; forced when the recovery unit is active
    W20,
    /// 4-byte (40-bit) datapath
    W40,
}

/// Static per-device configuration, injected at construction
#[derive(Debug, Copy, Clone)]
pub struct DeviceConfig {
    pub gt: GtType,
    /// Active TX lanes per quad, 0..=4
    pub tx_channels: u8,
    /// Active RX lanes per quad, 0..=4
    pub rx_channels: u8,
    pub tx_protocol: Protocol,
    pub rx_protocol: Protocol,
    pub tx_pll: PllType,
    pub rx_pll: PllType,
    pub tx_refclk_sel: RefClkSel,
    pub rx_refclk_sel: RefClkSel,
    pub ppc: Ppc,
    pub data_width: DataWidth,
    /// Recovery unit present in hardware
    pub dru_present: bool,
    /// Fixed DRU reference clock, Hz (only meaningful when `dru_present`)
    pub dru_refclk_hz: u64,
    /// Raise error-notification register bits on asynchronous failures
    pub err_irq_en: bool,
    /// Control-interface clock, Hz; converts watchdog periods to tick counts
    pub sys_clk_hz: u32,
    /// Quads driven by this instance, 1..=MAX_QUADS
    pub quads: u8,
}

impl DeviceConfig {
    /// Check internal consistency. Run once at device construction.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tx_channels as usize > CHANNELS_PER_QUAD
            || self.rx_channels as usize > CHANNELS_PER_QUAD
        {
            return Err(Error::InvalidParam);
        }
        if self.quads == 0 || self.quads as usize > MAX_QUADS {
            return Err(Error::InvalidParam);
        }
        if self.tx_protocol != Protocol::None && !self.tx_pll.valid_for(self.gt) {
            return Err(Error::InvalidParam);
        }
        if self.rx_protocol != Protocol::None && !self.rx_pll.valid_for(self.gt) {
            return Err(Error::InvalidParam);
        }
        if self.dru_present && self.dru_refclk_hz == 0 {
            return Err(Error::InvalidParam);
        }
        if self.sys_clk_hz == 0 {
            return Err(Error::InvalidParam);
        }
        Ok(())
    }

    /// PLL assignment for a direction
    #[inline]
    pub fn pll(&self, dir: Direction) -> PllType {
        match dir {
            Direction::Tx => self.tx_pll,
            Direction::Rx => self.rx_pll,
        }
    }

    /// Protocol bound to a direction
    #[inline]
    pub fn protocol(&self, dir: Direction) -> Protocol {
        match dir {
            Direction::Tx => self.tx_protocol,
            Direction::Rx => self.rx_protocol,
        }
    }

    /// Reference clock selection for a direction
    #[inline]
    pub fn refclk_sel(&self, dir: Direction) -> RefClkSel {
        match dir {
            Direction::Tx => self.tx_refclk_sel,
            Direction::Rx => self.rx_refclk_sel,
        }
    }

    /// Active lane count for a direction
    #[inline]
    pub fn channels(&self, dir: Direction) -> usize {
        match dir {
            Direction::Tx => self.tx_channels as usize,
            Direction::Rx => self.rx_channels as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DeviceConfig {
        DeviceConfig {
            gt: GtType::Gthe3,
            tx_channels: 4,
            rx_channels: 4,
            tx_protocol: Protocol::Hdmi,
            rx_protocol: Protocol::Hdmi,
            tx_pll: PllType::Cpll,
            rx_pll: PllType::Qpll0,
            tx_refclk_sel: RefClkSel::Ref0,
            rx_refclk_sel: RefClkSel::Ref1,
            ppc: Ppc::Two,
            data_width: DataWidth::W40,
            dru_present: true,
            dru_refclk_hz: 156_250_000,
            err_irq_en: true,
            sys_clk_hz: 100_000_000,
            quads: 1,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(cfg().validate(), Ok(()));
    }

    #[test]
    fn pll_must_match_gt_type() {
        let mut c = cfg();
        c.rx_pll = PllType::Pll0; // GTPE2-only selection on a GTHE3
        assert_eq!(c.validate(), Err(Error::InvalidParam));

        c = cfg();
        c.gt = GtType::Gtpe2;
        c.tx_pll = PllType::Pll0;
        c.rx_pll = PllType::Pll1;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn unused_direction_skips_pll_check() {
        let mut c = cfg();
        c.rx_protocol = Protocol::None;
        c.rx_pll = PllType::Pll0;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn dru_requires_refclk() {
        let mut c = cfg();
        c.dru_refclk_hz = 0;
        assert_eq!(c.validate(), Err(Error::InvalidParam));
    }

    #[test]
    fn channel_count_bounds() {
        let mut c = cfg();
        c.tx_channels = 5;
        assert_eq!(c.validate(), Err(Error::InvalidParam));
    }
}
