//! PLL divisor calculation
//!
//! Finds an integer divisor set (M, N1, N2, D) realizing a requested serial
//! line rate from a reference clock, constrained to the discrete candidate
//! values the transceiver hardware implements and to the VCO range of the
//! selected PLL:
//!
//! `line_rate = refclk * N1 * N2 * doubling / (M * D)`, exactly, with
//! `VCO = refclk * N1 * N2 / M` inside one of the PLL's bands.
//!
//! Candidates are tried N2-outer, then N1, then M, with the output divider D
//! innermost; the first exact match is committed. No further optimization
//! (for instance lowest VCO) is attempted; lane and PLL settings on real
//! links are characterized against this first-match behavior.

use embedded_hal::blocking::delay::DelayUs;

use crate::access::{self, RegisterBus};
use crate::config::{ChannelId, GtType, PllType};
use crate::errors::*;
use crate::registers::*;

/// Committed PLL divisor set
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Divisors {
    /// Reference divider
    pub m: u8,
    /// First feedback divider
    pub n1: u8,
    /// Second feedback divider
    pub n2: u8,
    /// Serial output divider
    pub d: u8,
}

/// Divisor candidates for the channel-PLL class
const CPLL_N1: &[u8] = &[5, 4];
const CPLL_N2: &[u8] = &[5, 4, 3, 2, 1];
const CPLL_M: &[u8] = &[1, 2];
const CPLL_D: &[u8] = &[1, 2, 4, 8];

/// Divisor candidates for the common-PLL class. N1 carries the whole
/// feedback division (N2 is fixed at 1 in hardware).
const QPLL_N1: &[u8] = &[
    16, 20, 32, 40, 64, 66, 75, 80, 84, 90, 96, 100, 112, 120, 125, 150, 160,
];
const QPLL_N2: &[u8] = &[1];
const QPLL_M: &[u8] = &[1, 2, 3, 4];
const QPLL_D: &[u8] = &[1, 2, 4, 8, 16];

struct PllTables {
    n1: &'static [u8],
    n2: &'static [u8],
    m: &'static [u8],
    d: &'static [u8],
    /// VCO bands, Hz. GTXE2 QPLL has two disjoint bands (lower/upper); all
    /// other combinations have one.
    bands: &'static [(u64, u64)],
}

const GHZ: u64 = 1_000_000_000;

fn tables(gt: GtType, pll: PllType) -> Result<&'static PllTables, Error> {
    static GTXE2_CPLL: PllTables = PllTables {
        n1: CPLL_N1,
        n2: CPLL_N2,
        m: CPLL_M,
        d: CPLL_D,
        bands: &[(1_600_000_000, 3_300_000_000)],
    };
    static GTXE2_QPLL: PllTables = PllTables {
        n1: QPLL_N1,
        n2: QPLL_N2,
        m: QPLL_M,
        d: QPLL_D,
        bands: &[(5_930_000_000, 8_000_000_000), (9_800_000_000, 12_500_000_000)],
    };
    static GTHE_CPLL: PllTables = PllTables {
        n1: CPLL_N1,
        n2: CPLL_N2,
        m: CPLL_M,
        d: CPLL_D,
        bands: &[(2 * GHZ, 6_250_000_000)],
    };
    static GTHE_QPLL0: PllTables = PllTables {
        n1: QPLL_N1,
        n2: QPLL_N2,
        m: QPLL_M,
        d: QPLL_D,
        bands: &[(9_800_000_000, 16_375_000_000)],
    };
    static GTHE_QPLL1: PllTables = PllTables {
        n1: QPLL_N1,
        n2: QPLL_N2,
        m: QPLL_M,
        d: QPLL_D,
        bands: &[(8 * GHZ, 13 * GHZ)],
    };
    static GTPE2_PLL: PllTables = PllTables {
        n1: CPLL_N1,
        n2: CPLL_N2,
        m: CPLL_M,
        d: CPLL_D,
        bands: &[(1_600_000_000, 3_300_000_000)],
    };

    match (gt, pll) {
        (GtType::Gtxe2, PllType::Cpll) => Ok(&GTXE2_CPLL),
        (GtType::Gtxe2, PllType::Qpll) => Ok(&GTXE2_QPLL),
        (GtType::Gthe3, PllType::Cpll) | (GtType::Gthe4, PllType::Cpll) => Ok(&GTHE_CPLL),
        (GtType::Gthe3, PllType::Qpll0) | (GtType::Gthe4, PllType::Qpll0) => Ok(&GTHE_QPLL0),
        (GtType::Gthe3, PllType::Qpll1) | (GtType::Gthe4, PllType::Qpll1) => Ok(&GTHE_QPLL1),
        (GtType::Gtpe2, PllType::Pll0) | (GtType::Gtpe2, PllType::Pll1) => Ok(&GTPE2_PLL),
        _ => Err(Error::InvalidParam),
    }
}

/// Type-dependent doubling factor applied between VCO and line rate
pub fn doubling(gt: GtType, _pll: PllType) -> u64 {
    match gt {
        GtType::Gtpe2 => 2,
        _ => 1,
    }
}

/// Line rate produced by a divisor set, Hz (rounded down; an exact-match
/// search result is always exact)
pub fn line_rate_hz(gt: GtType, pll: PllType, refclk_hz: u64, div: &Divisors) -> u64 {
    refclk_hz * div.n1 as u64 * div.n2 as u64 * doubling(gt, pll)
        / (div.m as u64 * div.d as u64)
}

/// Search the candidate tables for a divisor set realizing `line_rate_hz`
/// exactly from `refclk_hz`, within the VCO range of (`gt`, `pll`).
///
/// Fails with [`Error::CalcFailed`] when no combination exists; the caller's
/// previously committed parameters are untouched in that case.
pub fn calc_divisors(
    gt: GtType,
    pll: PllType,
    refclk_hz: u64,
    line_rate_hz: u64,
) -> Result<Divisors, Error> {
    let t = tables(gt, pll)?;
    if refclk_hz == 0 || line_rate_hz == 0 {
        return Err(Error::CalcFailed);
    }
    let dbl = doubling(gt, pll);

    for &n2 in t.n2 {
        for &n1 in t.n1 {
            let fb = refclk_hz * n1 as u64 * n2 as u64;
            for &m in t.m {
                // VCO = fb / m, compared against the band edges without
                // losing the fractional part.
                let m64 = m as u64;
                if !t.bands.iter().any(|&(lo, hi)| fb >= lo * m64 && fb <= hi * m64) {
                    continue;
                }
                for &d in t.d {
                    let den = m64 * d as u64;
                    if fb * dbl == line_rate_hz * den {
                        return Ok(Divisors { m, n1, n2, d });
                    }
                }
            }
        }
    }
    Err(Error::CalcFailed)
}

/// Encoding of the serial output divider: log2(D)
fn out_div_code(d: u8) -> u16 {
    match d {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 4,
    }
}

/// Program a committed divisor set into a lane over the indirect protocol.
///
/// `tx` selects which half of the output-divider word is rewritten; the
/// other direction's divider is preserved.
pub(crate) fn program_divisors<B, D>(
    bus: &mut B,
    delay: &mut D,
    base: u32,
    gt: GtType,
    ch: ChannelId,
    tx: bool,
    div: &Divisors,
) -> Result<(), Error>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    let fb = ((div.n1 as u16) << 4) | div.n2 as u16;
    access::drp_write(bus, delay, base, gt, ch, DRP_ADDR_PLL_DIV0, fb)?;
    access::drp_write(bus, delay, base, gt, ch, DRP_ADDR_PLL_DIV1, div.m as u16)?;

    let cur = access::drp_read(bus, delay, base, gt, ch, DRP_ADDR_OUT_DIV)?;
    let code = out_div_code(div.d);
    let word = if tx {
        (cur & !0x000F) | code
    } else {
        (cur & !0x0F00) | (code << 8)
    };
    access::drp_write(bus, delay, base, gt, ch, DRP_ADDR_OUT_DIV, word)
}

/// RX CDR bandwidth words for a committed configuration.
///
/// The middle word scales the loop bandwidth with the VCO-derived recovered
/// clock: larger output dividers slow the recovered clock and call for a
/// proportionally lower bandwidth. With the recovery unit active the lane
/// runs oversampled and the CDR is pinned at the lowest setting regardless
/// of the divider.
fn rx_cdr_words(div: &Divisors, dru_active: bool) -> [u16; 5] {
    let bw = if dru_active {
        0x0004
    } else {
        match div.d {
            1 => 0x0020,
            2 => 0x0010,
            4 => 0x0008,
            _ => 0x0004,
        }
    };
    [0x0000, 0x1040, bw, 0x07E0, 0x0001]
}

/// RX equalizer word; the recovery-enabled flag gates the selection
fn rx_eq_word(dru_active: bool) -> u16 {
    if dru_active {
        // low-power linear mode, DFE off
        0x0104
    } else {
        0x0954
    }
}

/// CDR/equalization configuration step run after every successful divisor
/// commit on an RX lane
pub(crate) fn configure_rx_cdr<B, D>(
    bus: &mut B,
    delay: &mut D,
    base: u32,
    gt: GtType,
    ch: ChannelId,
    div: &Divisors,
    dru_active: bool,
) -> Result<(), Error>
where
    B: RegisterBus,
    D: DelayUs<u16>,
{
    let words = rx_cdr_words(div, dru_active);
    for (i, &w) in words.iter().enumerate() {
        access::drp_write(bus, delay, base, gt, ch, DRP_ADDR_RXCDR_CFG0 + i as u16, w)?;
    }
    access::drp_write(bus, delay, base, gt, ch, DRP_ADDR_RX_EQ_CFG, rx_eq_word(dru_active))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBus, NoDelay};

    const MHZ: u64 = 1_000_000;

    fn rate(gt: GtType, pll: PllType, refclk: u64, d: &Divisors) -> u64 {
        line_rate_hz(gt, pll, refclk, d)
    }

    #[test]
    fn gthe3_cpll_hdmi_baseline() {
        // 148.5 MHz reference, 1.485 Gbps: the canonical HD rate.
        let d = calc_divisors(GtType::Gthe3, PllType::Cpll, 148_500_000, 1_485_000_000).unwrap();
        assert_eq!(d, Divisors { m: 1, n1: 4, n2: 5, d: 2 });
        // VCO = 148.5 MHz * 20 = 2.97 GHz, inside [2.0, 6.25] GHz.
        assert_eq!(
            rate(GtType::Gthe3, PllType::Cpll, 148_500_000, &d),
            1_485_000_000
        );
    }

    #[test]
    fn first_match_order_is_n2_n1_m_d() {
        // 3.0 Gbps from 150 MHz: N2=5/N1=4/M=1/D=1 (VCO 3.0 GHz) is hit
        // before any N2=4 combination that would also satisfy the rate.
        let d = calc_divisors(GtType::Gthe3, PllType::Cpll, 150 * MHZ, 3_000_000_000).unwrap();
        assert_eq!(d, Divisors { m: 1, n1: 4, n2: 5, d: 1 });
    }

    #[test]
    fn qpll0_high_rate() {
        let d = calc_divisors(GtType::Gthe4, PllType::Qpll0, 156_250_000, 10_000_000_000).unwrap();
        assert_eq!(
            rate(GtType::Gthe4, PllType::Qpll0, 156_250_000, &d),
            10_000_000_000
        );
        // N2 is fixed at 1 for the common PLL class.
        assert_eq!(d.n2, 1);
        let vco = 156_250_000 * d.n1 as u64 * d.n2 as u64 / d.m as u64;
        assert!(vco >= 9_800_000_000 && vco <= 16_375_000_000);
    }

    #[test]
    fn gtxe2_qpll_rejects_between_bands() {
        // VCO 9.0 GHz falls in the gap between the two GTXE2 QPLL bands.
        // 112.5 MHz * 80 = 9.0 GHz would otherwise match 9.0 Gbps at D=1.
        let r = calc_divisors(GtType::Gtxe2, PllType::Qpll, 112_500_000, 9_000_000_000);
        assert_eq!(r, Err(Error::CalcFailed));
        // The same reference reaches 6.0 Gbps via the lower band instead.
        let d = calc_divisors(GtType::Gtxe2, PllType::Qpll, 112_500_000, 6_000_000_000).unwrap();
        let vco = 112_500_000 * d.n1 as u64 / d.m as u64;
        assert!(vco >= 5_930_000_000 && vco <= 8_000_000_000);
    }

    #[test]
    fn gtpe2_applies_doubling_factor() {
        // GTPE2 line rate carries a x2: 1.485 Gbps needs VCO*2/D to hit the
        // target with VCO within [1.6, 3.3] GHz.
        let d = calc_divisors(GtType::Gtpe2, PllType::Pll0, 148_500_000, 1_485_000_000).unwrap();
        assert_eq!(
            rate(GtType::Gtpe2, PllType::Pll0, 148_500_000, &d),
            1_485_000_000
        );
        let vco = 148_500_000 * d.n1 as u64 * d.n2 as u64 / d.m as u64;
        assert!((1_600_000_000..=3_300_000_000).contains(&vco));
    }

    #[test]
    fn unreachable_rate_fails() {
        // No integer combination turns 27 MHz into 1.485 Gbps within the
        // CPLL VCO range.
        assert_eq!(
            calc_divisors(GtType::Gthe3, PllType::Cpll, 27 * MHZ, 1_485_000_000),
            Err(Error::CalcFailed)
        );
    }

    #[test]
    fn pll_selection_must_exist_on_type() {
        assert_eq!(
            calc_divisors(GtType::Gtxe2, PllType::Qpll0, 148_500_000, 1_485_000_000),
            Err(Error::InvalidParam)
        );
    }

    #[test]
    fn committed_invariant_holds_across_envelope() {
        // Sweep a grid of references and targets; every success must satisfy
        // the committed-divisor identity exactly and sit inside a VCO band.
        let refs = [27 * MHZ, 74_250_000, 100 * MHZ, 125 * MHZ, 148_500_000, 156_250_000];
        let rates = [
            270_000_000u64,
            1_485_000_000,
            2_970_000_000,
            3_712_500_000,
            5_000_000_000,
            5_940_000_000,
        ];
        for &r in &refs {
            for &lr in &rates {
                if let Ok(d) = calc_divisors(GtType::Gthe3, PllType::Cpll, r, lr) {
                    let num = r * d.n1 as u64 * d.n2 as u64;
                    assert_eq!(num % (d.m as u64 * d.d as u64), 0);
                    assert_eq!(num / (d.m as u64 * d.d as u64), lr);
                    let lo = 2_000_000_000 * d.m as u64;
                    let hi = 6_250_000_000 * d.m as u64;
                    assert!(num >= lo && num <= hi);
                }
            }
        }
    }

    #[test]
    fn program_divisors_preserves_other_direction_out_div() {
        let mut bus = FakeBus::new();
        let mut d = NoDelay;
        let gt = GtType::Gthe3;
        let ch = ChannelId::Ch1;
        let tx_div = Divisors { m: 1, n1: 4, n2: 5, d: 2 };
        let rx_div = Divisors { m: 1, n1: 5, n2: 5, d: 4 };
        program_divisors(&mut bus, &mut d, 0, gt, ch, true, &tx_div).unwrap();
        program_divisors(&mut bus, &mut d, 0, gt, ch, false, &rx_div).unwrap();
        let word = bus.drp_value(drp_ctrl(0), DRP_ADDR_OUT_DIV);
        // TX log2(2)=1 in [3:0], RX log2(4)=2 in [11:8]
        assert_eq!(word, 0x0201);
    }

    #[test]
    fn cdr_words_follow_out_div_and_dru_gate() {
        assert_eq!(rx_cdr_words(&Divisors { m: 1, n1: 4, n2: 5, d: 1 }, false)[2], 0x0020);
        assert_eq!(rx_cdr_words(&Divisors { m: 1, n1: 4, n2: 5, d: 4 }, false)[2], 0x0008);
        // DRU active pins the bandwidth word regardless of divider.
        assert_eq!(rx_cdr_words(&Divisors { m: 1, n1: 4, n2: 5, d: 1 }, true)[2], 0x0004);
        assert_ne!(rx_eq_word(true), rx_eq_word(false));
    }
}
