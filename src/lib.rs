//! flowgate: a gateway block for streaming dataflow engines.
//!
//! A [`GatewayBlock`] looks like any other block to the scheduler but
//! forwards start, stop, forecast and work to an externally supplied
//! [`Handler`]. Every call travels through one reused [`CallRecord`]; the
//! handler drives engine state (consumption, tags, messages) through the
//! [`BlockProxy`] accessors on the [`Call`] it receives.

pub mod block;
pub mod builder;
mod dispatch;
pub mod gateway;
pub mod handler;
pub mod harness;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod msg;
pub mod pmt;
pub mod policy;
pub mod proxy;
pub mod record;
pub mod signature;
pub mod tag;

pub use block::{Block, BlockCore, WorkStatus};
pub use builder::GatewayBuilder;
pub use gateway::{Activation, BuildError, Direction, DispatchState, GatewayBlock, GatewayError};
pub use handler::{share, Call, Handler, HandlerFault, LifecycleHandler, SharedHandler};
pub use harness::{GatewayHarness, HarnessError};
pub use msg::MsgQueue;
pub use pmt::Pmt;
pub use policy::{RatePolicy, WorkMode};
pub use proxy::{BlockProxy, ProxyError};
pub use record::{Action, CallRecord, RecordError, WORK_CALLED_PRODUCE, WORK_INSUFFICIENT_INPUT};
pub use signature::{IoSignature, SignatureError};
pub use tag::{Tag, TagPropagation, TagStore};
