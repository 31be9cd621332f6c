//! Builder API for gateway blocks.

use crate::gateway::{BuildError, GatewayBlock};
use crate::handler::SharedHandler;
use crate::policy::WorkMode;
use crate::signature::IoSignature;

/// Chained configuration for [`GatewayBlock::make`].
///
/// Streams default to none, the mode to general and the factor to 1.
#[derive(Debug, Clone)]
pub struct GatewayBuilder {
    name: String,
    inputs: IoSignature,
    outputs: IoSignature,
    mode: WorkMode,
    factor: u32,
    msg_input: bool,
    msg_outputs: usize,
}

impl GatewayBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: IoSignature::null(),
            outputs: IoSignature::null(),
            mode: WorkMode::General,
            factor: 1,
            msg_input: false,
            msg_outputs: 0,
        }
    }

    pub fn inputs(mut self, signature: IoSignature) -> Self {
        self.inputs = signature;
        self
    }

    pub fn outputs(mut self, signature: IoSignature) -> Self {
        self.outputs = signature;
        self
    }

    pub fn mode(mut self, mode: WorkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Decimation or interpolation factor.
    pub fn factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Shorthand for `mode(Sync)`.
    pub fn sync(self) -> Self {
        self.mode(WorkMode::Sync)
    }

    /// Shorthand for `mode(Decim).factor(factor)`.
    pub fn decim(self, factor: u32) -> Self {
        self.mode(WorkMode::Decim).factor(factor)
    }

    /// Shorthand for `mode(Interp).factor(factor)`.
    pub fn interp(self, factor: u32) -> Self {
        self.mode(WorkMode::Interp).factor(factor)
    }

    pub fn msg_input(mut self, enabled: bool) -> Self {
        self.msg_input = enabled;
        self
    }

    pub fn msg_outputs(mut self, groups: usize) -> Self {
        self.msg_outputs = groups;
        self
    }

    /// Build the block around `handler`.
    pub fn build(self, handler: SharedHandler) -> Result<GatewayBlock, BuildError> {
        GatewayBlock::make(
            handler,
            &self.name,
            self.inputs,
            self.outputs,
            self.mode,
            self.factor,
            self.msg_input,
            self.msg_outputs,
        )
    }
}
