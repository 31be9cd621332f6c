//! Handler contract: the externally supplied behavior of a gateway block.
//!
//! A handler has one entry point, [`Handler::call`]. It reads the action
//! and arguments from the call record, may drive the block through the
//! proxy, writes its result into the record, and returns. Handlers that
//! prefer one method per action implement [`LifecycleHandler`] instead; a
//! blanket impl adapts it.

use crate::block::BlockCore;
use crate::proxy::{BlockProxy, ProxyError};
use crate::record::{Action, CallRecord, RecordError};
use std::any::Any;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Handler shared between its creator and the gateway block.
pub type SharedHandler = Arc<Mutex<dyn Handler>>;

/// Wrap a handler for sharing. Keep the returned `Arc` to inspect the
/// handler after the block ran; pass a clone to the block.
pub fn share<H: Handler + 'static>(handler: H) -> Arc<Mutex<H>> {
    Arc::new(Mutex::new(handler))
}

/// A handler failed instead of returning normally. Fatal to the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("handler panicked: {}", detail))
    }
}

impl From<RecordError> for HandlerFault {
    fn from(err: RecordError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ProxyError> for HandlerFault {
    fn from(err: ProxyError) -> Self {
        Self::new(err.to_string())
    }
}

/// Everything a handler sees during one dispatch.
///
/// The buffer borrows end when the handler returns, so no handler can
/// keep a buffer past its call.
pub struct Call<'a, 'b> {
    record: &'a mut CallRecord,
    block: &'a mut BlockCore,
    inputs: &'a [&'a [u8]],
    outputs: &'a mut [&'b mut [u8]],
}

impl<'a, 'b> Call<'a, 'b> {
    pub(crate) fn new(
        record: &'a mut CallRecord,
        block: &'a mut BlockCore,
        inputs: &'a [&'a [u8]],
        outputs: &'a mut [&'b mut [u8]],
    ) -> Self {
        Self {
            record,
            block,
            inputs,
            outputs,
        }
    }

    pub fn action(&self) -> Action {
        self.record.action()
    }

    pub fn record(&self) -> &CallRecord {
        &*self.record
    }

    pub fn record_mut(&mut self) -> &mut CallRecord {
        &mut *self.record
    }

    pub fn ninputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn noutputs(&self) -> usize {
        self.outputs.len()
    }

    /// Raw bytes of input `port`, starting at the oldest history item.
    pub fn input(&self, port: usize) -> Result<&[u8], ProxyError> {
        self.inputs.get(port).copied().ok_or(ProxyError::InvalidPort {
            direction: "input",
            port,
            count: self.inputs.len(),
        })
    }

    /// Writable bytes of output `port`.
    pub fn output(&mut self, port: usize) -> Result<&mut [u8], ProxyError> {
        let count = self.outputs.len();
        match self.outputs.get_mut(port) {
            Some(buf) => Ok(&mut buf[..]),
            None => Err(ProxyError::InvalidPort {
                direction: "output",
                port,
                count,
            }),
        }
    }

    /// All input and output buffers at once, for handlers that read and
    /// write in the same pass.
    pub fn io(&mut self) -> (&'a [&'a [u8]], &mut [&'b mut [u8]]) {
        (self.inputs, &mut *self.outputs)
    }

    pub fn input_item_size(&self, port: usize) -> usize {
        self.block.input_signature().item_size(port)
    }

    pub fn output_item_size(&self, port: usize) -> usize {
        self.block.output_signature().item_size(port)
    }
}

impl BlockProxy for Call<'_, '_> {
    fn block(&self) -> &BlockCore {
        &*self.block
    }

    fn block_mut(&mut self) -> &mut BlockCore {
        &mut *self.block
    }
}

/// Object-safe handler entry point.
pub trait Handler: Send {
    fn call(&mut self, call: &mut Call<'_, '_>) -> Result<(), HandlerFault>;
}

/// One method per lifecycle action.
pub trait LifecycleHandler: Send {
    fn on_start(&mut self, _block: &mut BlockCore) -> Result<bool, HandlerFault> {
        Ok(true)
    }

    fn on_stop(&mut self, _block: &mut BlockCore) -> Result<bool, HandlerFault> {
        Ok(true)
    }

    /// Defaults to one input item per output item plus the history window.
    fn on_forecast(
        &mut self,
        noutput_items: usize,
        required: &mut [usize],
        block: &BlockCore,
    ) -> Result<(), HandlerFault> {
        required.fill(noutput_items.saturating_add(block.history() - 1));
        Ok(())
    }

    /// Returns items produced or a negative signal.
    fn on_work(&mut self, call: &mut Call<'_, '_>) -> Result<i64, HandlerFault>;
}

impl<T: LifecycleHandler> Handler for T {
    fn call(&mut self, call: &mut Call<'_, '_>) -> Result<(), HandlerFault> {
        match call.action() {
            Action::Start => {
                let ok = self.on_start(&mut *call.block)?;
                call.record.set_start_return(ok)?;
            }
            Action::Stop => {
                let ok = self.on_stop(&mut *call.block)?;
                call.record.set_stop_return(ok)?;
            }
            Action::Forecast => {
                let args = call.record.forecast_mut()?;
                self.on_forecast(args.noutput_items, &mut args.ninput_items_required, &*call.block)?;
            }
            Action::Work | Action::GeneralWork => {
                let produced = self.on_work(call)?;
                call.record.set_work_return(produced)?;
            }
        }
        Ok(())
    }
}
