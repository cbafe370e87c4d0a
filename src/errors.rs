//! Driver errors

/// Driver error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No divisor combination realizes the requested line rate within the
    /// PLL's VCO range. Previously committed parameters are untouched.
    CalcFailed,
    /// A busy/ready/lock/done bit was not observed within the bounded retry
    /// count. The affected direction may be left partially reconfigured;
    /// recover by re-entering configuration from `Idle`.
    PollTimeout,
    /// The requested pixel format/clock exceeds the user-clock generator or
    /// protocol limits. Also raised asynchronously through the
    /// error-notification register when enabled.
    FormatNotSupported,
    /// Reference clock below the per-type minimum and no recovery unit is
    /// present.
    NoRecoveryPath,
    /// Register bus access fault.
    Bus,
    /// Out-of-range quad/channel/direction argument, or a PLL selection the
    /// transceiver type does not provide.
    InvalidParam,
}
