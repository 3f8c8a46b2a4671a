//! Default timings for the standard scanners.

use std::time::Duration;

/// Recommended size of the scheduler pool. Must exceed the number of
/// scanners expected to be enabled at once, so a stuck scanner cannot
/// starve the others.
pub const DEFAULT_SCHEDULER_THREADS: usize = 5;

/// Bound on the status scanner's host round trip.
pub const DEFAULT_HOST_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deploy failures tolerated per descriptor before logging escalates to `error`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Window in which deploy failures are counted.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Timing and fan-out of one scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    /// Pause between the end of one cycle and the start of the next.
    pub cycle_delay: Duration,

    /// Budget for all checks of one cycle.
    pub scan_timeout: Duration,

    /// Checks allowed to run at once within a cycle.
    pub check_concurrency: usize,
}

impl ScannerSettings {
    /// Defaults for the status scanner.
    pub fn status() -> Self {
        Self {
            cycle_delay: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(30),
            check_concurrency: 64,
        }
    }

    /// Defaults for the auto-deploy scanner.
    pub fn auto_deploy() -> Self {
        Self {
            cycle_delay: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(120),
            check_concurrency: 16,
        }
    }

    /// Defaults for the auto-kill scanner.
    pub fn auto_kill() -> Self {
        Self {
            cycle_delay: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(60),
            check_concurrency: 16,
        }
    }

    /// Defaults for the auto-remove scanner. It makes no remote calls, so
    /// it can run often.
    pub fn auto_remove() -> Self {
        Self {
            cycle_delay: Duration::from_secs(1),
            scan_timeout: Duration::from_secs(5),
            check_concurrency: 64,
        }
    }

    /// Override the cycle delay.
    pub fn with_cycle_delay(mut self, cycle_delay: Duration) -> Self {
        self.cycle_delay = cycle_delay;
        self
    }

    /// Override the cycle budget.
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    /// Override the per-cycle fan-out. Zero is treated as one.
    pub fn with_check_concurrency(mut self, check_concurrency: usize) -> Self {
        self.check_concurrency = check_concurrency.max(1);
        self
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self::status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_remove_runs_more_often_than_status() {
        assert!(ScannerSettings::auto_remove().cycle_delay < ScannerSettings::status().cycle_delay);
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let settings = ScannerSettings::status().with_check_concurrency(0);
        assert_eq!(settings.check_concurrency, 1);
    }
}
