//! Single-block harness: a scheduler stand-in for driving a gateway block.
//!
//! The harness owns one byte stream per input and per output. It primes
//! the history window on activation, sizes each call through forecast and
//! applies the block's consumption and production to the streams the way
//! the engine's buffers would. Output tags move downstream with the bytes.

use crate::block::WorkStatus;
use crate::gateway::{GatewayBlock, GatewayError};
use crate::invariant_ppt::{assert_invariant, HISTORY_PRIMED};
use crate::proxy::{BlockProxy, ProxyError};
use crate::tag::Tag;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HarnessError {
    #[error("block '{block}' declined to start")]
    ActivationFailed { block: String },
    #[error("harness is not active")]
    NotActive,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Harness around one gateway block.
pub struct GatewayHarness {
    block: GatewayBlock,
    inputs: Vec<Vec<u8>>,
    outputs: Vec<Vec<u8>>,
    output_tags: Vec<Vec<Tag>>,
    scratch: Vec<Vec<u8>>,
    available: Vec<usize>,
    required: Vec<usize>,
    capacity: usize,
    active: bool,
}

impl GatewayHarness {
    /// Connect `block` with the given stream counts. `capacity` is the
    /// output space offered per call, in items.
    pub fn new(
        mut block: GatewayBlock,
        ninputs: usize,
        noutputs: usize,
        capacity: usize,
    ) -> Result<Self, HarnessError> {
        block.connect(ninputs, noutputs)?;
        let scratch = (0..noutputs)
            .map(|port| vec![0u8; capacity * block.block().output_signature().item_size(port)])
            .collect();
        Ok(Self {
            block,
            inputs: vec![Vec::new(); ninputs],
            outputs: vec![Vec::new(); noutputs],
            output_tags: vec![Vec::new(); noutputs],
            scratch,
            available: vec![0; ninputs],
            required: vec![0; ninputs],
            capacity,
            active: false,
        })
    }

    pub fn block(&self) -> &GatewayBlock {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut GatewayBlock {
        &mut self.block
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn input_port(&self, port: usize) -> Result<(), ProxyError> {
        if port < self.inputs.len() {
            Ok(())
        } else {
            Err(ProxyError::InvalidPort {
                direction: "input",
                port,
                count: self.inputs.len(),
            })
        }
    }

    /// Append raw item bytes to input `port`.
    pub fn push_input(&mut self, port: usize, bytes: &[u8]) -> Result<(), HarnessError> {
        self.input_port(port)?;
        self.inputs[port].extend_from_slice(bytes);
        Ok(())
    }

    /// Attach an upstream tag to input `port`.
    pub fn push_input_tag(&mut self, port: usize, tag: Tag) -> Result<(), HarnessError> {
        self.block.block_mut().push_input_tag(port, tag)?;
        Ok(())
    }

    pub fn deliver_msg(&mut self, msg: Tag) -> Result<(), HarnessError> {
        self.block.deliver_msg(msg)?;
        Ok(())
    }

    /// Everything produced so far on output `port`.
    pub fn output(&self, port: usize) -> &[u8] {
        self.outputs.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Take and clear the bytes produced on output `port`.
    pub fn take_output(&mut self, port: usize) -> Vec<u8> {
        self.outputs.get_mut(port).map(std::mem::take).unwrap_or_default()
    }

    /// Tags that reached output `port` so far.
    pub fn output_tags(&self, port: usize) -> &[Tag] {
        self.output_tags.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Take and clear the tags that reached output `port`.
    pub fn take_output_tags(&mut self, port: usize) -> Vec<Tag> {
        self.output_tags.get_mut(port).map(std::mem::take).unwrap_or_default()
    }

    /// Items waiting on input `port`, history window included.
    pub fn pending_input(&self, port: usize) -> usize {
        let size = self.block.block().input_signature().item_size(port);
        self.inputs.get(port).map_or(0, |bytes| bytes.len() / size)
    }

    /// Start the block and prime each input with `history - 1` zero items.
    pub fn activate(&mut self) -> Result<(), HarnessError> {
        if !self.block.start()? {
            return Err(HarnessError::ActivationFailed {
                block: self.block.name().to_string(),
            });
        }
        let window = self.block.history() - 1;
        for (port, stream) in self.inputs.iter_mut().enumerate() {
            let size = self.block.block().input_signature().item_size(port);
            let mut primed = vec![0u8; window * size];
            primed.append(stream);
            *stream = primed;
        }
        assert_invariant(
            HISTORY_PRIMED,
            (0..self.inputs.len()).all(|port| self.pending_input(port) >= window),
            "every input holds the history window",
            Some("activate"),
        );
        self.active = true;
        log::debug!("harness activated block '{}'", self.block.name());
        Ok(())
    }

    /// Stop the block. The harness refuses further calls either way.
    pub fn deactivate(&mut self) -> Result<bool, HarnessError> {
        self.active = false;
        Ok(self.block.stop()?)
    }

    /// Largest output request, halving from capacity, whose forecast the
    /// pending input satisfies.
    fn size_call(&mut self) -> Result<usize, HarnessError> {
        let mut n = self.capacity;
        if self.inputs.is_empty() {
            return Ok(n);
        }
        while n > 0 {
            self.block.forecast(n, &mut self.required)?;
            if self
                .required
                .iter()
                .zip(&self.available)
                .all(|(need, have)| need <= have)
            {
                return Ok(n);
            }
            n /= 2;
        }
        Ok(0)
    }

    /// Make one scheduling decision and, if input allows, one work call.
    pub fn run_once(&mut self) -> Result<WorkStatus, HarnessError> {
        if !self.active {
            return Err(HarnessError::NotActive);
        }
        for port in 0..self.inputs.len() {
            self.available[port] = self.pending_input(port);
        }

        let msg_pending = self.block.has_msg_input() && self.block.check_msg_queue();
        let stream_less = self.inputs.is_empty() && self.outputs.is_empty();
        if stream_less && !msg_pending {
            return Ok(WorkStatus::Starved);
        }
        let n = self.size_call()?;
        if n == 0 && !msg_pending {
            return Ok(WorkStatus::Starved);
        }

        let inputs: Vec<&[u8]> = self.inputs.iter().map(Vec::as_slice).collect();
        let mut outputs: Vec<&mut [u8]> = self.scratch.iter_mut().map(|b| &mut b[..]).collect();
        let status = self
            .block
            .general_work(n, &self.available, &inputs, &mut outputs)?;
        if status == WorkStatus::Starved {
            return Ok(status);
        }

        let core = self.block.block();
        for (port, stream) in self.inputs.iter_mut().enumerate() {
            let size = core.input_signature().item_size(port);
            stream.drain(..core.consumed(port) * size);
        }
        for (port, stream) in self.outputs.iter_mut().enumerate() {
            let size = core.output_signature().item_size(port);
            stream.extend_from_slice(&self.scratch[port][..core.produced(port) * size]);
        }
        let core = self.block.block_mut();
        for (port, tags) in self.output_tags.iter_mut().enumerate() {
            tags.append(&mut core.take_output_tags(port));
        }
        Ok(status)
    }

    /// Call [`run_once`](Self::run_once) until the block starves or
    /// `max_calls` calls did work. Returns the calls that did work.
    pub fn run(&mut self, max_calls: usize) -> Result<usize, HarnessError> {
        let mut calls = 0;
        while calls < max_calls {
            if self.run_once()? == WorkStatus::Starved {
                break;
            }
            calls += 1;
        }
        Ok(calls)
    }
}
