//! Constants

/// Maximum number of poll iterations for any busy/ready/done wait.
///
/// Every wait in the driver is a bounded busy-poll: [`POLL_RETRY_MAX`]
/// iterations of [`POLL_INTERVAL_US`] each, after which the operation fails
/// with `Error::PollTimeout`. Worst-case latency per wait is therefore
/// 150 us plus register access time; callers see bounded latency as a
/// contract, not an implementation detail.
pub const POLL_RETRY_MAX: u32 = 150;

/// Delay between poll iterations
pub const POLL_INTERVAL_US: u16 = 1;

/// Settle delay inserted before indirect accesses that are redirected to the
/// shared/common channel (GTPE2)
pub const DRP_REDIRECT_SETTLE_US: u16 = 10;

/// Lanes per quad
pub const CHANNELS_PER_QUAD: usize = 4;

/// Shared PLLs per quad
pub const COMMON_PLLS_PER_QUAD: usize = 2;

/// Quads addressable by one device instance
pub const MAX_QUADS: usize = 2;

/// Clock detector frequency rounding granularity, Hz.
///
/// The measurement register counts in core clock ticks; successive reads of
/// the same input jitter by a few kHz, so detected frequencies are rounded
/// to this granularity before any comparison.
pub const CLKDET_FREQ_GRANULARITY_HZ: u64 = 10_000;

/// Fixed DRU line rate, Hz. When the reference clock is below the per-type
/// minimum PLL input frequency the lane runs at this rate and the recovery
/// unit re-times the incoming stream.
pub const DRU_LINE_RATE_HZ: u64 = 2_500_000_000;

/// Fixed-point scale of the DRU center frequency registers (2^32, split
/// across the low/high register pair)
pub const DRU_CFREQ_SHIFT: u32 = 32;

/// DRU loop gain G1
pub const DRU_GAIN_G1: u8 = 9;

/// DRU loop gain G1_P
pub const DRU_GAIN_G1_P: u8 = 16;

/// DRU loop gain G2
pub const DRU_GAIN_G2: u8 = 5;

/// User-clock generator (MMCM) VCO lower bound, Hz
pub const MMCM_FVCO_MIN_HZ: u64 = 600_000_000;

/// User-clock generator (MMCM) VCO upper bound, Hz
pub const MMCM_FVCO_MAX_HZ: u64 = 1_200_000_000;

/// Largest multiply factor the generator supports
pub const MMCM_MULT_MAX: u16 = 64;

/// Largest per-output divide value the generator supports
pub const MMCM_DIV_MAX: u16 = 128;

/// Reconfiguration watchdog period, ms. Armed whenever a direction leaves
/// `Idle`; expiry re-triggers a full configuration pass for that direction.
pub const TMR_TIMEOUT_MS: u32 = 500;

/// TX alignment watchdog period, ms
pub const ALIGN_TIMEOUT_MS: u32 = 100;
