//! Work-mode policy: the rate family a gateway block belongs to.

#![forbid(unsafe_code)]

use std::fmt;
use thiserror::Error;

/// How forecast and work are computed. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    /// Independent per-port counts; the handler owns consumption.
    General,
    /// One output item per input item.
    Sync,
    /// One output item per `factor` input items.
    Decim,
    /// `factor` output items per input item.
    Interp,
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkMode::General => "general",
            WorkMode::Sync => "sync",
            WorkMode::Decim => "decim",
            WorkMode::Interp => "interp",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{0} mode needs a factor of at least 1")]
    ZeroFactor(WorkMode),
}

/// A work mode together with its rate factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    mode: WorkMode,
    factor: usize,
}

impl RatePolicy {
    /// `factor` only matters for `Decim` and `Interp`; other modes store 1.
    pub fn new(mode: WorkMode, factor: u32) -> Result<Self, PolicyError> {
        let factor = match mode {
            WorkMode::General | WorkMode::Sync => 1,
            WorkMode::Decim | WorkMode::Interp if factor == 0 => {
                return Err(PolicyError::ZeroFactor(mode))
            }
            WorkMode::Decim | WorkMode::Interp => factor as usize,
        };
        Ok(Self { mode, factor })
    }

    pub fn mode(&self) -> WorkMode {
        self.mode
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn is_fixed_rate(&self) -> bool {
        self.mode != WorkMode::General
    }

    /// Input items needed per port to produce `noutput` items, or `None`
    /// in general mode where only the handler knows.
    pub fn fixed_rate_ninput(&self, noutput: usize, history: usize) -> Option<usize> {
        let window = history.saturating_sub(1);
        let needed = match self.mode {
            WorkMode::General => return None,
            WorkMode::Sync => noutput,
            WorkMode::Decim => noutput.saturating_mul(self.factor),
            WorkMode::Interp => noutput.div_ceil(self.factor),
        };
        Some(needed.saturating_add(window))
    }

    /// Largest output count `navailable` input items support. General mode
    /// places no bound.
    pub fn max_noutput(&self, navailable: usize, history: usize) -> usize {
        let usable = navailable.saturating_sub(history.saturating_sub(1));
        match self.mode {
            WorkMode::General => usize::MAX,
            WorkMode::Sync => usable,
            WorkMode::Decim => usable / self.factor,
            WorkMode::Interp => usable.saturating_mul(self.factor),
        }
    }

    /// Input items consumed per port when `produced` items were produced.
    pub fn implied_consumption(&self, produced: usize) -> usize {
        match self.mode {
            WorkMode::General | WorkMode::Sync => produced,
            WorkMode::Decim => produced * self.factor,
            WorkMode::Interp => produced / self.factor,
        }
    }

    /// Output/input ratio declared to the scheduler.
    pub fn relative_rate(&self) -> f64 {
        match self.mode {
            WorkMode::General | WorkMode::Sync => 1.0,
            WorkMode::Decim => 1.0 / self.factor as f64,
            WorkMode::Interp => self.factor as f64,
        }
    }

    /// Output granularity the mode imposes, if any.
    pub fn output_multiple(&self) -> Option<usize> {
        match self.mode {
            WorkMode::Interp => Some(self.factor),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_factor_rejected_only_when_used() {
        assert_eq!(
            RatePolicy::new(WorkMode::Decim, 0),
            Err(PolicyError::ZeroFactor(WorkMode::Decim))
        );
        assert!(RatePolicy::new(WorkMode::Interp, 0).is_err());
        assert_eq!(RatePolicy::new(WorkMode::Sync, 0).unwrap().factor(), 1);
        assert_eq!(RatePolicy::new(WorkMode::General, 7).unwrap().factor(), 1);
    }

    #[test]
    fn forecast_formulas() {
        let decim = RatePolicy::new(WorkMode::Decim, 4).unwrap();
        assert_eq!(decim.fixed_rate_ninput(10, 1), Some(40));
        assert_eq!(decim.fixed_rate_ninput(10, 5), Some(44));

        let interp = RatePolicy::new(WorkMode::Interp, 3).unwrap();
        assert_eq!(interp.fixed_rate_ninput(10, 1), Some(4));
        assert_eq!(interp.fixed_rate_ninput(9, 2), Some(4));

        let sync = RatePolicy::new(WorkMode::Sync, 1).unwrap();
        assert_eq!(sync.fixed_rate_ninput(6, 3), Some(8));

        let general = RatePolicy::new(WorkMode::General, 1).unwrap();
        assert_eq!(general.fixed_rate_ninput(6, 3), None);
    }

    #[test]
    fn declared_rates() {
        assert_eq!(RatePolicy::new(WorkMode::Decim, 4).unwrap().relative_rate(), 0.25);
        assert_eq!(RatePolicy::new(WorkMode::Interp, 4).unwrap().relative_rate(), 4.0);
        assert_eq!(RatePolicy::new(WorkMode::Interp, 4).unwrap().output_multiple(), Some(4));
        assert_eq!(RatePolicy::new(WorkMode::Decim, 4).unwrap().output_multiple(), None);
    }

    #[test]
    fn history_window_reduces_supply() {
        let sync = RatePolicy::new(WorkMode::Sync, 1).unwrap();
        assert_eq!(sync.max_noutput(10, 4), 7);
        assert_eq!(sync.max_noutput(2, 4), 0);
    }

    proptest! {
        #[test]
        fn forecast_supports_request(
            mode in prop_oneof![Just(WorkMode::Sync), Just(WorkMode::Decim), Just(WorkMode::Interp)],
            factor in 1u32..16,
            k in 0usize..4096,
            history in 1usize..32,
        ) {
            let policy = RatePolicy::new(mode, factor).unwrap();
            let need = policy.fixed_rate_ninput(k, history).unwrap();
            prop_assert!(policy.max_noutput(need, history) >= k);
        }
    }
}
