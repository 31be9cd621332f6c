//! Forecast and work dispatch: the per-call hot path of a gateway block.
//!
//! Everything here runs once per scheduler call. It allocates nothing and
//! takes no lock other than the handler's own mutex.

use crate::block::{Block, WorkStatus};
use crate::gateway::{Direction, DispatchState, GatewayBlock, GatewayError};
use crate::handler::{Call, HandlerFault};
use crate::policy::WorkMode;
use crate::record::{Action, WORK_CALLED_PRODUCE};
use std::iter;
use std::panic::{self, AssertUnwindSafe};

impl GatewayBlock {
    /// Run the handler on the record as currently prepared.
    ///
    /// A handler error, a panic or a poisoned handler lock faults the block.
    pub(crate) fn invoke(
        &mut self,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<(), GatewayError> {
        self.ensure_not_faulted()?;
        let action = self.record.action();
        self.state = DispatchState::Dispatching(action);

        let GatewayBlock {
            core,
            record,
            handler,
            ..
        } = self;
        let outcome = match handler.lock() {
            Ok(mut guard) => {
                let mut call = Call::new(record, core, inputs, outputs);
                match panic::catch_unwind(AssertUnwindSafe(|| guard.call(&mut call))) {
                    Ok(result) => result,
                    Err(payload) => Err(HandlerFault::from_panic(payload)),
                }
            }
            Err(_) => Err(HandlerFault::new("handler lock poisoned")),
        };

        self.state = DispatchState::Idle;
        outcome.map_err(|fault| {
            self.faulted = true;
            log::error!(
                "block '{}' handler faulted during {}: {}",
                self.core.name(),
                action,
                fault
            );
            GatewayError::HandlerFault {
                block: self.core.name().to_string(),
                action,
                fault,
            }
        })
    }

    /// A handler broke its contract after returning. Fatal.
    fn violation(&mut self, err: GatewayError) -> GatewayError {
        self.faulted = true;
        log::error!("block '{}': {}", self.core.name(), err);
        err
    }

    /// Byte sizes that overflow `usize` are reported as needing `usize::MAX`.
    fn check_buffers(
        &self,
        noutput_items: usize,
        ninput_items: &[usize],
        inputs: &[&[u8]],
        outputs: &[&mut [u8]],
    ) -> Result<(), GatewayError> {
        let ninputs = self.core.ninputs();
        if inputs.len() != ninputs || ninput_items.len() != ninputs {
            return Err(GatewayError::PortCount {
                direction: Direction::Input,
                count: inputs.len().max(ninput_items.len()),
            });
        }
        if outputs.len() != self.core.noutputs() {
            return Err(GatewayError::PortCount {
                direction: Direction::Output,
                count: outputs.len(),
            });
        }
        for (port, (buf, &items)) in inputs.iter().zip(ninput_items).enumerate() {
            let needed = items
                .checked_mul(self.core.input_signature().item_size(port))
                .unwrap_or(usize::MAX);
            if buf.len() < needed {
                return Err(GatewayError::BufferMismatch {
                    direction: Direction::Input,
                    port,
                    needed,
                    len: buf.len(),
                });
            }
        }
        for (port, buf) in outputs.iter().enumerate() {
            let needed = noutput_items
                .checked_mul(self.core.output_signature().item_size(port))
                .unwrap_or(usize::MAX);
            if buf.len() < needed {
                return Err(GatewayError::BufferMismatch {
                    direction: Direction::Output,
                    port,
                    needed,
                    len: buf.len(),
                });
            }
        }
        Ok(())
    }

    /// Check pending counters against what the call was given, then fold
    /// them into the absolute counters.
    fn settle(&mut self, noutput_items: usize, ninput_items: &[usize]) -> Result<(), GatewayError> {
        for (port, &available) in ninput_items.iter().enumerate() {
            let consumed = self.core.consumed(port);
            if consumed > available {
                return Err(self.violation(GatewayError::Overconsumed {
                    port,
                    consumed,
                    available,
                }));
            }
        }
        for port in 0..self.core.noutputs() {
            let produced = self.core.produced(port);
            if produced > noutput_items {
                return Err(self.violation(GatewayError::Overproduced {
                    port,
                    produced,
                    capacity: noutput_items,
                }));
            }
        }
        self.core.finish_call();
        Ok(())
    }

    fn starved(&mut self, action: Action) -> WorkStatus {
        self.core.begin_call();
        log::trace!("block '{}' {} starved", self.core.name(), action);
        WorkStatus::Starved
    }

    /// Input items each port needs to produce `noutput_items`.
    ///
    /// Fixed-rate modes answer from the rate formula; general mode asks
    /// the handler.
    pub fn forecast(&mut self, noutput_items: usize, required: &mut [usize]) -> Result<(), GatewayError> {
        self.ensure_not_faulted()?;
        if required.len() != self.core.ninputs() {
            return Err(GatewayError::PortCount {
                direction: Direction::Input,
                count: required.len(),
            });
        }
        if let Some(need) = self.policy.fixed_rate_ninput(noutput_items, self.core.history()) {
            required.fill(need);
            return Ok(());
        }

        self.record.prepare_forecast(noutput_items, required.len());
        self.invoke(&[], &mut [])?;
        let answer = &self.record.forecast()?.ninput_items_required;
        if answer.len() != required.len() {
            return Err(GatewayError::ForecastShape {
                expected: required.len(),
                got: answer.len(),
            });
        }
        required.copy_from_slice(answer);
        Ok(())
    }

    /// Scheduler entry for every mode. Fixed-rate modes go through
    /// [`work`](Self::work).
    pub fn general_work(
        &mut self,
        noutput_items: usize,
        ninput_items: &[usize],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<WorkStatus, GatewayError> {
        if self.policy.is_fixed_rate() {
            return self.work(noutput_items, ninput_items, inputs, outputs);
        }
        self.ensure_started()?;
        self.check_buffers(noutput_items, ninput_items, inputs, outputs)?;

        self.core.begin_call();
        self.record.prepare_work(
            Action::GeneralWork,
            ninput_items.iter().copied(),
            noutput_items,
            self.core.noutputs(),
        );
        self.invoke(inputs, outputs)?;

        let ret = self.record.work()?.return_value;
        let status = match ret {
            WORK_CALLED_PRODUCE => WorkStatus::CalledProduce,
            r if r < 0 => return Ok(self.starved(Action::GeneralWork)),
            r => {
                let produced = r as usize;
                if produced > noutput_items {
                    return Err(self.violation(GatewayError::Overproduced {
                        port: 0,
                        produced,
                        capacity: noutput_items,
                    }));
                }
                self.core.produce_each(produced);
                WorkStatus::Produced(produced)
            }
        };
        self.settle(noutput_items, ninput_items)?;
        log::trace!(
            "block '{}' general_work: {:?} of {}",
            self.core.name(),
            status,
            noutput_items
        );
        Ok(status)
    }

    /// Fixed-rate dispatch.
    ///
    /// Clamps the output count to what the inputs support and to the
    /// output multiple, hands the handler the fixed-rate input counts, then
    /// applies the implied consumption and production.
    pub fn work(
        &mut self,
        noutput_items: usize,
        ninput_items: &[usize],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<WorkStatus, GatewayError> {
        if self.policy.mode() == WorkMode::General {
            return Err(GatewayError::UnsupportedAction {
                action: Action::Work,
                mode: WorkMode::General,
            });
        }
        self.ensure_started()?;
        self.check_buffers(noutput_items, ninput_items, inputs, outputs)?;

        let history = self.core.history();
        let mut n = ninput_items
            .iter()
            .fold(noutput_items, |n, &avail| n.min(self.policy.max_noutput(avail, history)));
        n -= n % self.core.output_multiple();
        if n == 0 && !self.has_msg_input {
            return Ok(self.starved(Action::Work));
        }
        let need = self
            .policy
            .fixed_rate_ninput(n, history)
            .unwrap_or_default();

        self.core.begin_call();
        self.record.prepare_work(
            Action::Work,
            iter::repeat(need).take(self.core.ninputs()),
            n,
            self.core.noutputs(),
        );
        self.invoke(inputs, outputs)?;

        let ret = self.record.work()?.return_value;
        if ret < 0 {
            return Ok(self.starved(Action::Work));
        }
        let produced = ret as usize;
        if produced > n {
            return Err(self.violation(GatewayError::Overproduced {
                port: 0,
                produced,
                capacity: n,
            }));
        }
        if !self.core.consume_called() {
            self.core.consume_each(self.policy.implied_consumption(produced));
        }
        let status = if self.core.produce_called() {
            WorkStatus::CalledProduce
        } else {
            self.core.produce_each(produced);
            WorkStatus::Produced(produced)
        };
        self.settle(n, ninput_items)?;
        log::trace!("block '{}' work: {:?} of {}", self.core.name(), status, n);
        Ok(status)
    }
}

impl Block for GatewayBlock {
    fn start(&mut self) -> Result<bool, GatewayError> {
        GatewayBlock::start(self)
    }

    fn stop(&mut self) -> Result<bool, GatewayError> {
        GatewayBlock::stop(self)
    }

    fn forecast(&mut self, noutput_items: usize, required: &mut [usize]) -> Result<(), GatewayError> {
        GatewayBlock::forecast(self, noutput_items, required)
    }

    fn general_work(
        &mut self,
        noutput_items: usize,
        ninput_items: &[usize],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<WorkStatus, GatewayError> {
        GatewayBlock::general_work(self, noutput_items, ninput_items, inputs, outputs)
    }
}
