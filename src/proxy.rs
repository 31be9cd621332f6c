//! Block state proxy: the accessor set a handler uses to drive engine state.
//!
//! Every operation forwards to [`BlockCore`] unchanged. The trait is
//! implemented by the core itself, by [`GatewayBlock`](crate::gateway::GatewayBlock)
//! for the scheduler, and by [`Call`](crate::handler::Call) for a handler in
//! the middle of a dispatch.

use crate::block::BlockCore;
use crate::pmt::Pmt;
use crate::tag::{Tag, TagPropagation};
use thiserror::Error;

/// A proxy call the engine refused. The dispatch in flight is unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    #[error("no {direction} port {port} (block has {count})")]
    InvalidPort {
        direction: &'static str,
        port: usize,
        count: usize,
    },
    #[error("tag range start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("message queue is empty")]
    EmptyQueue,
    #[error("no message output group {group} (block has {count})")]
    InvalidMsgGroup { group: usize, count: usize },
    #[error("relative rate must be positive and finite, got {0}")]
    InvalidRate(f64),
    #[error("output multiple must be at least 1")]
    InvalidMultiple,
    #[error("history must be at least 1")]
    InvalidHistory,
    #[error("block has no message input")]
    NoMessageInput,
}

/// Forwarding contract onto engine-owned block state.
pub trait BlockProxy {
    fn block(&self) -> &BlockCore;
    fn block_mut(&mut self) -> &mut BlockCore;

    fn unique_id(&self) -> i64 {
        self.block().unique_id()
    }

    fn name(&self) -> &str {
        self.block().name()
    }

    fn history(&self) -> usize {
        self.block().history()
    }

    fn set_history(&mut self, history: usize) -> Result<(), ProxyError> {
        self.block_mut().set_history(history)
    }

    fn output_multiple(&self) -> usize {
        self.block().output_multiple()
    }

    fn set_output_multiple(&mut self, multiple: usize) -> Result<(), ProxyError> {
        self.block_mut().set_output_multiple(multiple)
    }

    fn consume(&mut self, which_input: usize, how_many: usize) -> Result<(), ProxyError> {
        self.block_mut().consume(which_input, how_many)
    }

    fn consume_each(&mut self, how_many: usize) {
        self.block_mut().consume_each(how_many)
    }

    fn produce(&mut self, which_output: usize, how_many: usize) -> Result<(), ProxyError> {
        self.block_mut().produce(which_output, how_many)
    }

    fn relative_rate(&self) -> f64 {
        self.block().relative_rate()
    }

    fn set_relative_rate(&mut self, rate: f64) -> Result<(), ProxyError> {
        self.block_mut().set_relative_rate(rate)
    }

    fn nitems_read(&self, which_input: usize) -> Result<u64, ProxyError> {
        self.block().nitems_read(which_input)
    }

    fn nitems_written(&self, which_output: usize) -> Result<u64, ProxyError> {
        self.block().nitems_written(which_output)
    }

    fn tag_propagation_policy(&self) -> TagPropagation {
        self.block().tag_propagation_policy()
    }

    fn set_tag_propagation_policy(&mut self, policy: TagPropagation) {
        self.block_mut().set_tag_propagation_policy(policy)
    }

    fn add_item_tag(&mut self, which_output: usize, tag: Tag) -> Result<(), ProxyError> {
        self.block_mut().add_item_tag(which_output, tag)
    }

    /// Build and emit a tag in one step.
    fn add_item_tag_kv(
        &mut self,
        which_output: usize,
        abs_offset: u64,
        key: Pmt,
        value: Pmt,
        srcid: Option<Pmt>,
    ) -> Result<(), ProxyError> {
        let tag = Tag {
            offset: abs_offset,
            key,
            value,
            srcid,
        };
        self.block_mut().add_item_tag(which_output, tag)
    }

    /// Snapshot of the tags on `which_input` with offsets in `[abs_start, abs_end)`.
    fn get_tags_in_range(
        &self,
        which_input: usize,
        abs_start: u64,
        abs_end: u64,
    ) -> Result<Vec<Tag>, ProxyError> {
        self.block().get_tags_in_range(which_input, abs_start, abs_end, None)
    }

    /// Like [`get_tags_in_range`](Self::get_tags_in_range), keeping only tags keyed `key`.
    fn get_tags_in_range_by_key(
        &self,
        which_input: usize,
        abs_start: u64,
        abs_end: u64,
        key: &Pmt,
    ) -> Result<Vec<Tag>, ProxyError> {
        self.block()
            .get_tags_in_range(which_input, abs_start, abs_end, Some(key))
    }

    fn check_msg_queue(&self) -> bool {
        self.block().check_msg_queue()
    }

    fn pop_msg_queue(&mut self) -> Result<Tag, ProxyError> {
        self.block_mut().pop_msg_queue()
    }

    fn post_msg(&mut self, group: usize, msg: Tag) -> Result<(), ProxyError> {
        self.block_mut().post_msg(group, msg)
    }

    /// Build and post a message in one step.
    fn post_msg_kv(
        &mut self,
        group: usize,
        key: Pmt,
        value: Pmt,
        srcid: Option<Pmt>,
    ) -> Result<(), ProxyError> {
        let msg = Tag {
            offset: 0,
            key,
            value,
            srcid,
        };
        self.block_mut().post_msg(group, msg)
    }
}

impl BlockProxy for BlockCore {
    fn block(&self) -> &BlockCore {
        self
    }

    fn block_mut(&mut self) -> &mut BlockCore {
        self
    }
}
