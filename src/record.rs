//! The call record: the one channel between the dispatcher and a handler.
//!
//! A block owns exactly one record for its whole life. Each dispatch
//! rewrites it from scratch: the action is set, every field group is
//! cleared (vectors keep their capacity), and only the group belonging to
//! the action is filled. Accessors refuse to hand out a group whose action
//! is not current, so a handler cannot read residue from an earlier call.

use std::fmt;
use thiserror::Error;

/// Sentinel a general-mode handler returns after calling `produce` per port.
pub const WORK_CALLED_PRODUCE: i64 = -2;

/// Return value signalling "not enough input, try again later".
pub const WORK_INSUFFICIENT_INPUT: i64 = -1;

/// Which scheduler callback is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GeneralWork,
    Work,
    Forecast,
    Start,
    Stop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::GeneralWork => "general_work",
            Action::Work => "work",
            Action::Forecast => "forecast",
            Action::Start => "start",
            Action::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// A field group was requested outside its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record holds a {actual} call, not {expected}")]
pub struct RecordError {
    pub expected: &'static str,
    pub actual: Action,
}

/// Work fields: counts in, produced count out.
#[derive(Debug, Clone, Default)]
pub struct WorkArgs {
    /// Input items available per input port.
    pub ninput_items: Vec<usize>,
    /// Output capacity per output port.
    pub noutput_items: Vec<usize>,
    /// Items produced, or a negative signal.
    pub return_value: i64,
}

impl WorkArgs {
    /// Output capacity common to every port; zero for a block without outputs.
    pub fn noutput(&self) -> usize {
        self.noutput_items.first().copied().unwrap_or(0)
    }
}

/// Forecast fields.
#[derive(Debug, Clone, Default)]
pub struct ForecastArgs {
    /// Output items the scheduler would like produced.
    pub noutput_items: usize,
    /// Filled by the handler: input items needed per input port.
    pub ninput_items_required: Vec<usize>,
}

/// Shared, reused request/response structure.
#[derive(Debug, Clone)]
pub struct CallRecord {
    action: Action,
    work: WorkArgs,
    forecast: ForecastArgs,
    start_return: bool,
    stop_return: bool,
}

impl Default for CallRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRecord {
    pub fn new() -> Self {
        Self {
            action: Action::Start,
            work: WorkArgs::default(),
            forecast: ForecastArgs::default(),
            start_return: false,
            stop_return: false,
        }
    }

    /// Record with vectors pre-sized for the given port counts.
    pub fn with_ports(ninputs: usize, noutputs: usize) -> Self {
        let mut record = Self::new();
        record.work.ninput_items.reserve(ninputs);
        record.work.noutput_items.reserve(noutputs);
        record.forecast.ninput_items_required.reserve(ninputs);
        record
    }

    pub fn action(&self) -> Action {
        self.action
    }

    fn begin(&mut self, action: Action) {
        self.action = action;
        self.work.ninput_items.clear();
        self.work.noutput_items.clear();
        self.work.return_value = 0;
        self.forecast.noutput_items = 0;
        self.forecast.ninput_items_required.clear();
        self.start_return = false;
        self.stop_return = false;
    }

    pub(crate) fn prepare_start(&mut self) {
        self.begin(Action::Start);
    }

    pub(crate) fn prepare_stop(&mut self) {
        self.begin(Action::Stop);
    }

    pub(crate) fn prepare_forecast(&mut self, noutput_items: usize, ninputs: usize) {
        self.begin(Action::Forecast);
        self.forecast.noutput_items = noutput_items;
        self.forecast.ninput_items_required.resize(ninputs, 0);
    }

    pub(crate) fn prepare_work(
        &mut self,
        action: Action,
        ninput_items: impl IntoIterator<Item = usize>,
        noutput_items: usize,
        noutputs: usize,
    ) {
        self.begin(action);
        self.work.ninput_items.extend(ninput_items);
        self.work.noutput_items.resize(noutputs, noutput_items);
    }

    fn is_work(&self) -> bool {
        matches!(self.action, Action::Work | Action::GeneralWork)
    }

    fn wrong(&self, expected: &'static str) -> RecordError {
        RecordError {
            expected,
            actual: self.action,
        }
    }

    pub fn work(&self) -> Result<&WorkArgs, RecordError> {
        if self.is_work() {
            Ok(&self.work)
        } else {
            Err(self.wrong("work"))
        }
    }

    pub fn work_mut(&mut self) -> Result<&mut WorkArgs, RecordError> {
        if self.is_work() {
            Ok(&mut self.work)
        } else {
            Err(self.wrong("work"))
        }
    }

    /// Shorthand for writing the work return value.
    pub fn set_work_return(&mut self, value: i64) -> Result<(), RecordError> {
        self.work_mut()?.return_value = value;
        Ok(())
    }

    pub fn forecast(&self) -> Result<&ForecastArgs, RecordError> {
        if self.action == Action::Forecast {
            Ok(&self.forecast)
        } else {
            Err(self.wrong("forecast"))
        }
    }

    pub fn forecast_mut(&mut self) -> Result<&mut ForecastArgs, RecordError> {
        if self.action == Action::Forecast {
            Ok(&mut self.forecast)
        } else {
            Err(self.wrong("forecast"))
        }
    }

    pub fn start_return(&self) -> Result<bool, RecordError> {
        if self.action == Action::Start {
            Ok(self.start_return)
        } else {
            Err(self.wrong("start"))
        }
    }

    pub fn set_start_return(&mut self, ok: bool) -> Result<(), RecordError> {
        if self.action != Action::Start {
            return Err(self.wrong("start"));
        }
        self.start_return = ok;
        Ok(())
    }

    pub fn stop_return(&self) -> Result<bool, RecordError> {
        if self.action == Action::Stop {
            Ok(self.stop_return)
        } else {
            Err(self.wrong("stop"))
        }
    }

    pub fn set_stop_return(&mut self, ok: bool) -> Result<(), RecordError> {
        if self.action != Action::Stop {
            return Err(self.wrong("stop"));
        }
        self.stop_return = ok;
        Ok(())
    }
}
