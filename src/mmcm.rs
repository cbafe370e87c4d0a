//! User-clock generator (MMCM) configuration
//!
//! Maps a video format (pixel clock, pixels per clock, colour depth, sample
//! rate) and the committed line rate onto the generator's multiply/divide
//! factors. The multiply factor starts at the largest value the VCO allows,
//! scaled down to the divisibility the colour-depth ratio requires, and is
//! decremented until every output divide fits its bounds; running out of
//! candidates is a format-not-supported failure.

use embedded_hal::blocking::delay::DelayUs;

use crate::access::{rmw, RegisterBus};
use crate::config::{Bpc, DataWidth, Direction, Ppc};
use crate::constants::*;
use crate::errors::*;
use crate::registers::*;

/// Computed generator parameters
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MmcmParams {
    /// VCO multiply factor
    pub mult: u16,
    /// Input divide (always 1 on this core; the field exists in hardware)
    pub div: u16,
    /// Link clock output divide
    pub clkout0_div: u16,
    /// Stream clock output divide
    pub clkout1_div: u16,
    /// Video clock output divide
    pub clkout2_div: u16,
}

impl MmcmParams {
    /// All derived divide values inside documented bounds
    pub fn is_valid(&self) -> bool {
        let ok = |d: u16| (1..=MMCM_DIV_MAX).contains(&d);
        ok(self.clkout0_div) && ok(self.clkout1_div) && ok(self.clkout2_div)
            && self.clkout2_div != 0
    }
}

/// Serial bits consumed per user-clock cycle for a datapath width
fn bits_per_cycle(width: DataWidth) -> u64 {
    match width {
        DataWidth::W20 => 20,
        DataWidth::W40 => 40,
    }
}

/// Compute generator parameters for a video format.
///
/// `clkout0` tracks the link clock (`line_rate / bits_per_cycle`, rounded to
/// the nearest achievable divide), `clkout1` the stream clock
/// (`pixel_clk / sample_rate`), `clkout2` the video clock
/// (`pixel_clk / ppc`).
pub fn calc_mmcm(
    pixel_clk_hz: u64,
    ppc: Ppc,
    bpc: Bpc,
    sample_rate: u8,
    line_rate_hz: u64,
    width: DataWidth,
) -> Result<MmcmParams, Error> {
    if pixel_clk_hz == 0 || line_rate_hz == 0 {
        return Err(Error::FormatNotSupported);
    }
    if sample_rate == 0 || sample_rate > 5 {
        return Err(Error::InvalidParam);
    }

    let (num, _den) = bpc.ratio();
    // Deep-colour ratios only come out even for multiples of the ratio
    // numerator; scale the starting point down and keep the step aligned.
    let step = num;

    let mut mult = MMCM_MULT_MAX.min((MMCM_FVCO_MAX_HZ / pixel_clk_hz) as u16);
    mult -= mult % step;

    let link_clk_hz = line_rate_hz / bits_per_cycle(width);

    while mult >= step {
        let vco = pixel_clk_hz * mult as u64;
        if vco < MMCM_FVCO_MIN_HZ {
            break;
        }
        let clkout0_div = ((vco + link_clk_hz / 2) / link_clk_hz) as u16;
        let clkout1_div = mult * sample_rate as u16;
        let clkout2_div = mult * ppc.factor();
        let p = MmcmParams {
            mult,
            div: 1,
            clkout0_div,
            clkout1_div,
            clkout2_div,
        };
        if p.is_valid() {
            return Ok(p);
        }
        mult -= step;
    }
    Err(Error::FormatNotSupported)
}

/// Load parameters into the generator and bring it out of power-down.
///
/// The CFG words are double-buffered; `MMCM_CFG_NEW` latches them while the
/// generator is held in reset so the outputs never glitch.
pub(crate) fn program_mmcm<B, D>(
    bus: &mut B,
    _delay: &mut D,
    base: u32,
    dir: Direction,
    p: &MmcmParams,
) -> Result<(), Error>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    let cfg0 = Reg::<MmcmCfg0Reg>::default()
        .set(MmcmMult(p.mult))
        .set(MmcmDiv(p.div));
    let cfg1 = Reg::<MmcmCfg1Reg>::default()
        .set(ClkOut0Div(p.clkout0_div))
        .set(ClkOut1Div(p.clkout1_div));
    let cfg2 = Reg::<MmcmCfg2Reg>::default().set(ClkOut2Div(p.clkout2_div));

    bus.write(base + mmcm_cfg0(dir), cfg0.w)?;
    bus.write(base + mmcm_cfg1(dir), cfg1.w)?;
    bus.write(base + mmcm_cfg2(dir), cfg2.w)?;

    rmw(bus, base + mmcm_ctrl(dir), MMCM_RST_MASK, true)?;
    rmw(bus, base + mmcm_ctrl(dir), MMCM_PWRDWN_MASK, false)?;
    rmw(bus, base + mmcm_ctrl(dir), MMCM_CFG_NEW_MASK, true)?;
    rmw(bus, base + mmcm_ctrl(dir), MMCM_RST_MASK, false)
}

/// Power the generator down (frequency-change path)
pub(crate) fn disable_mmcm<B: RegisterBus>(
    bus: &mut B,
    base: u32,
    dir: Direction,
) -> Result<(), Error> {
    rmw(bus, base + mmcm_ctrl(dir), MMCM_PWRDWN_MASK, true)
}
