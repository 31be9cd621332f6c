//! The gateway block: a streaming block whose behavior lives in a handler.
//!
//! Construction and the start/stop lifecycle live here; forecast and work
//! dispatch live in `dispatch.rs`.

use crate::block::BlockCore;
use crate::handler::{HandlerFault, SharedHandler};
use crate::invariant_ppt::{
    assert_invariant, ACTIVATION_GATES_WORK, PORTS_WITHIN_SIGNATURE, RATE_DECLARED, RECORD_OWNED,
    SIGNATURE_ACCEPTED, START_RESULT_SURFACED, STOP_RESULT_SURFACED,
};
use crate::msg::MsgQueue;
use crate::policy::{PolicyError, RatePolicy, WorkMode};
use crate::proxy::{BlockProxy, ProxyError};
use crate::record::{Action, CallRecord, RecordError};
use crate::signature::IoSignature;
use crate::tag::Tag;
use std::fmt;
use thiserror::Error;

/// Which side of a block a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Invalid construction parameters. Raised by `make`, before any dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("block name is empty")]
    EmptyName,
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("{mode} mode needs at least one input and one output stream")]
    RateWithoutStreams { mode: WorkMode },
    #[error("block has no stream ports and no message ports")]
    NoPorts,
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Lifecycle and dispatch failures surfaced to the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("block '{block}' handler faulted during {action}: {fault}")]
    HandlerFault {
        block: String,
        action: Action,
        fault: HandlerFault,
    },
    #[error("block '{block}' is faulted and accepts no further calls")]
    Faulted { block: String },
    #[error("block '{block}' was not started")]
    NotStarted { block: String },
    #[error("{direction} side does not accept {count} streams")]
    PortCount { direction: Direction, count: usize },
    #[error("{direction} port {port} buffer holds {len} bytes, needs {needed}")]
    BufferMismatch {
        direction: Direction,
        port: usize,
        needed: usize,
        len: usize,
    },
    #[error("output port {port}: {produced} items produced, capacity is {capacity}")]
    Overproduced {
        port: usize,
        produced: usize,
        capacity: usize,
    },
    #[error("input port {port}: {consumed} items consumed, only {available} available")]
    Overconsumed {
        port: usize,
        consumed: usize,
        available: usize,
    },
    #[error("forecast returned {got} requirements for {expected} inputs")]
    ForecastShape { expected: usize, got: usize },
    #[error("{action} is not dispatched in {mode} mode")]
    UnsupportedAction { action: Action, mode: WorkMode },
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Where the block is in its scheduler-driven life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Created,
    Started,
    Stopped,
    /// Start returned false or faulted.
    Failed,
}

/// Dispatch state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching(Action),
}

/// A streaming block whose start, stop, forecast and work are served by
/// an external [`Handler`](crate::handler::Handler).
pub struct GatewayBlock {
    pub(crate) core: BlockCore,
    pub(crate) record: CallRecord,
    pub(crate) policy: RatePolicy,
    pub(crate) handler: SharedHandler,
    pub(crate) has_msg_input: bool,
    pub(crate) num_msg_outputs: usize,
    pub(crate) state: DispatchState,
    pub(crate) activation: Activation,
    pub(crate) faulted: bool,
}

impl fmt::Debug for GatewayBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBlock")
            .field("name", &self.core.name())
            .field("mode", &self.policy.mode())
            .field("factor", &self.policy.factor())
            .field("activation", &self.activation)
            .field("state", &self.state)
            .field("faulted", &self.faulted)
            .finish()
    }
}

impl GatewayBlock {
    /// Make a new gateway block.
    ///
    /// `factor` is the decimation or interpolation factor and is ignored in
    /// general and sync modes.
    #[allow(clippy::too_many_arguments)]
    pub fn make(
        handler: SharedHandler,
        name: &str,
        input_signature: IoSignature,
        output_signature: IoSignature,
        work_mode: WorkMode,
        factor: u32,
        has_msg_input: bool,
        num_msg_outputs: usize,
    ) -> Result<Self, BuildError> {
        if name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        let policy = RatePolicy::new(work_mode, factor)?;
        let rated = matches!(work_mode, WorkMode::Decim | WorkMode::Interp);
        if rated && (input_signature.min_streams() == 0 || output_signature.min_streams() == 0) {
            return Err(BuildError::RateWithoutStreams { mode: work_mode });
        }
        if input_signature.is_null()
            && output_signature.is_null()
            && !has_msg_input
            && num_msg_outputs == 0
        {
            return Err(BuildError::NoPorts);
        }

        let mut core = BlockCore::new(name, input_signature, output_signature, num_msg_outputs);
        assert_invariant(
            SIGNATURE_ACCEPTED,
            core.input_signature().accepts(core.ninputs())
                && core.output_signature().accepts(core.noutputs()),
            "initial port counts satisfy both signatures",
            Some("make"),
        );

        core.set_relative_rate(policy.relative_rate())?;
        if let Some(multiple) = policy.output_multiple() {
            core.set_output_multiple(multiple)?;
        }
        assert_invariant(
            RATE_DECLARED,
            core.relative_rate() == policy.relative_rate(),
            "relative rate matches the work mode",
            Some("make"),
        );

        let record = CallRecord::with_ports(core.ninputs(), core.noutputs());
        assert_invariant(RECORD_OWNED, true, "one call record per block", Some("make"));

        log::debug!(
            "made gateway block '{}' ({} mode, factor {}, msg in: {}, msg out groups: {})",
            core.name(),
            work_mode,
            policy.factor(),
            has_msg_input,
            num_msg_outputs
        );

        Ok(Self {
            core,
            record,
            policy,
            handler,
            has_msg_input,
            num_msg_outputs,
            state: DispatchState::Idle,
            activation: Activation::Created,
            faulted: false,
        })
    }

    /// The shared call record.
    pub fn record(&self) -> &CallRecord {
        &self.record
    }

    pub fn work_mode(&self) -> WorkMode {
        self.policy.mode()
    }

    pub fn factor(&self) -> usize {
        self.policy.factor()
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    pub fn has_msg_input(&self) -> bool {
        self.has_msg_input
    }

    pub fn num_msg_outputs(&self) -> usize {
        self.num_msg_outputs
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.state
    }

    /// True once a handler fault or contract violation stopped the block.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Set the number of connected streams on each side.
    ///
    /// Decimating and interpolating blocks need at least one stream on each
    /// side.
    pub fn connect(&mut self, ninputs: usize, noutputs: usize) -> Result<(), GatewayError> {
        let rated = matches!(self.policy.mode(), WorkMode::Decim | WorkMode::Interp);
        if !self.core.input_signature().accepts(ninputs) || (rated && ninputs == 0) {
            return Err(GatewayError::PortCount {
                direction: Direction::Input,
                count: ninputs,
            });
        }
        if !self.core.output_signature().accepts(noutputs) || (rated && noutputs == 0) {
            return Err(GatewayError::PortCount {
                direction: Direction::Output,
                count: noutputs,
            });
        }
        self.core.resize_ports(ninputs, noutputs);
        self.record = CallRecord::with_ports(ninputs, noutputs);
        assert_invariant(
            PORTS_WITHIN_SIGNATURE,
            self.core.ninputs() == ninputs && self.core.noutputs() == noutputs,
            "per-port state sized to the connection",
            Some("connect"),
        );
        Ok(())
    }

    /// The message inbox, if this block takes message input.
    pub fn msg_inbox(&self) -> Option<MsgQueue> {
        self.has_msg_input.then(|| self.core.msg_queue().clone())
    }

    /// Deliver a message to this block's inbox.
    pub fn deliver_msg(&self, msg: Tag) -> Result<(), ProxyError> {
        if !self.has_msg_input {
            return Err(ProxyError::NoMessageInput);
        }
        self.core.msg_queue().post(msg);
        Ok(())
    }

    /// Route message output `group` to `queue`.
    pub fn subscribe_msg(&mut self, group: usize, queue: MsgQueue) -> Result<(), ProxyError> {
        self.core.subscribe_msg(group, queue)
    }

    pub(crate) fn ensure_not_faulted(&self) -> Result<(), GatewayError> {
        if self.faulted {
            return Err(GatewayError::Faulted {
                block: self.core.name().to_string(),
            });
        }
        Ok(())
    }

    /// Dispatch START. `Ok(false)` means the handler declined; activation fails.
    pub fn start(&mut self) -> Result<bool, GatewayError> {
        self.ensure_not_faulted()?;
        self.record.prepare_start();
        if let Err(err) = self.invoke(&[], &mut []) {
            self.activation = Activation::Failed;
            return Err(err);
        }
        let ok = self.record.start_return()?;
        self.activation = if ok {
            log::debug!("block '{}' started", self.core.name());
            Activation::Started
        } else {
            log::warn!("block '{}' failed to start", self.core.name());
            Activation::Failed
        };
        assert_invariant(
            START_RESULT_SURFACED,
            ok == (self.activation == Activation::Started),
            "start result decides activation",
            Some("start"),
        );
        assert_invariant(
            ACTIVATION_GATES_WORK,
            ok || self.ensure_started().is_err(),
            "failed start refuses work",
            Some("start"),
        );
        Ok(ok)
    }

    /// Dispatch STOP. The block refuses work afterwards whatever the result.
    pub fn stop(&mut self) -> Result<bool, GatewayError> {
        self.ensure_not_faulted()?;
        self.record.prepare_stop();
        self.invoke(&[], &mut [])?;
        let ok = self.record.stop_return()?;
        if ok {
            log::debug!("block '{}' stopped", self.core.name());
        } else {
            log::warn!("block '{}' failed to stop cleanly", self.core.name());
        }
        if self.activation == Activation::Started {
            self.activation = Activation::Stopped;
        }
        assert_invariant(
            STOP_RESULT_SURFACED,
            self.activation != Activation::Started,
            "stopped block leaves the started state",
            Some("stop"),
        );
        Ok(ok)
    }

    pub(crate) fn ensure_started(&self) -> Result<(), GatewayError> {
        self.ensure_not_faulted()?;
        if self.activation != Activation::Started {
            return Err(GatewayError::NotStarted {
                block: self.core.name().to_string(),
            });
        }
        Ok(())
    }
}

impl BlockProxy for GatewayBlock {
    fn block(&self) -> &BlockCore {
        &self.core
    }

    fn block_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }
}
