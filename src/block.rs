//! Engine-owned block state and the scheduler's block contract.

#![forbid(unsafe_code)]

use crate::gateway::GatewayError;
use crate::msg::{MsgOutputs, MsgQueue};
use crate::pmt::Pmt;
use crate::proxy::{BlockProxy, ProxyError};
use crate::signature::IoSignature;
use crate::tag::{Tag, TagPropagation, TagStore};
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_UNIQUE_ID: AtomicI64 = AtomicI64::new(0);

/// Outcome of one work call, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Items produced on every output port.
    Produced(usize),
    /// The handler declared per-port production through `produce`.
    CalledProduce,
    /// Not enough input or output space; reschedule later.
    Starved,
}

/// What the scheduler requires of every block.
pub trait Block: BlockProxy {
    fn start(&mut self) -> Result<bool, GatewayError>;
    fn stop(&mut self) -> Result<bool, GatewayError>;

    /// Fill `required[i]` with the input items port `i` needs to produce
    /// `noutput_items`.
    fn forecast(&mut self, noutput_items: usize, required: &mut [usize]) -> Result<(), GatewayError>;

    fn general_work(
        &mut self,
        noutput_items: usize,
        ninput_items: &[usize],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<WorkStatus, GatewayError>;
}

/// Block state owned by the engine: identity, rate declarations, item
/// counters, tags and messages.
///
/// Consumption and production recorded during a work call stay pending
/// until [`finish_call`](Self::finish_call) folds them into the absolute
/// counters.
#[derive(Debug)]
pub struct BlockCore {
    unique_id: i64,
    name: String,
    input_signature: IoSignature,
    output_signature: IoSignature,
    history: usize,
    output_multiple: usize,
    relative_rate: f64,
    nitems_read: Vec<u64>,
    nitems_written: Vec<u64>,
    consumed: Vec<usize>,
    produced: Vec<usize>,
    consume_called: bool,
    produce_called: bool,
    tag_propagation: TagPropagation,
    input_tags: Vec<TagStore>,
    output_tags: Vec<TagStore>,
    msg_input: MsgQueue,
    msg_outputs: MsgOutputs,
}

impl BlockCore {
    /// Create block state sized for the minimum stream counts of each signature.
    pub fn new(
        name: &str,
        input_signature: IoSignature,
        output_signature: IoSignature,
        num_msg_outputs: usize,
    ) -> Self {
        let ninputs = input_signature.min_streams();
        let noutputs = output_signature.min_streams();
        let mut core = Self {
            unique_id: NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            input_signature,
            output_signature,
            history: 1,
            output_multiple: 1,
            relative_rate: 1.0,
            nitems_read: Vec::new(),
            nitems_written: Vec::new(),
            consumed: Vec::new(),
            produced: Vec::new(),
            consume_called: false,
            produce_called: false,
            tag_propagation: TagPropagation::default(),
            input_tags: Vec::new(),
            output_tags: Vec::new(),
            msg_input: MsgQueue::new(),
            msg_outputs: MsgOutputs::new(num_msg_outputs),
        };
        core.resize_ports(ninputs, noutputs);
        core
    }

    /// Size per-port state for the connected stream counts.
    pub(crate) fn resize_ports(&mut self, ninputs: usize, noutputs: usize) {
        self.nitems_read.resize(ninputs, 0);
        self.consumed.resize(ninputs, 0);
        self.input_tags.resize_with(ninputs, TagStore::new);
        self.nitems_written.resize(noutputs, 0);
        self.produced.resize(noutputs, 0);
        self.output_tags.resize_with(noutputs, TagStore::new);
    }

    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_signature(&self) -> &IoSignature {
        &self.input_signature
    }

    pub fn output_signature(&self) -> &IoSignature {
        &self.output_signature
    }

    pub fn ninputs(&self) -> usize {
        self.nitems_read.len()
    }

    pub fn noutputs(&self) -> usize {
        self.nitems_written.len()
    }

    pub fn history(&self) -> usize {
        self.history
    }

    pub fn set_history(&mut self, history: usize) -> Result<(), ProxyError> {
        if history == 0 {
            return Err(ProxyError::InvalidHistory);
        }
        self.history = history;
        Ok(())
    }

    pub fn output_multiple(&self) -> usize {
        self.output_multiple
    }

    pub fn set_output_multiple(&mut self, multiple: usize) -> Result<(), ProxyError> {
        if multiple == 0 {
            return Err(ProxyError::InvalidMultiple);
        }
        self.output_multiple = multiple;
        Ok(())
    }

    pub fn relative_rate(&self) -> f64 {
        self.relative_rate
    }

    pub fn set_relative_rate(&mut self, rate: f64) -> Result<(), ProxyError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ProxyError::InvalidRate(rate));
        }
        self.relative_rate = rate;
        Ok(())
    }

    fn input_port(&self, port: usize) -> Result<(), ProxyError> {
        if port < self.ninputs() {
            Ok(())
        } else {
            Err(ProxyError::InvalidPort {
                direction: "input",
                port,
                count: self.ninputs(),
            })
        }
    }

    fn output_port(&self, port: usize) -> Result<(), ProxyError> {
        if port < self.noutputs() {
            Ok(())
        } else {
            Err(ProxyError::InvalidPort {
                direction: "output",
                port,
                count: self.noutputs(),
            })
        }
    }

    pub fn consume(&mut self, which_input: usize, how_many: usize) -> Result<(), ProxyError> {
        self.input_port(which_input)?;
        self.consumed[which_input] += how_many;
        self.consume_called = true;
        Ok(())
    }

    pub fn consume_each(&mut self, how_many: usize) {
        for c in &mut self.consumed {
            *c += how_many;
        }
        self.consume_called = true;
    }

    pub fn produce(&mut self, which_output: usize, how_many: usize) -> Result<(), ProxyError> {
        self.output_port(which_output)?;
        self.produced[which_output] += how_many;
        self.produce_called = true;
        Ok(())
    }

    /// Record `how_many` produced items on every output. Used by the
    /// scheduler side when the return value carries production.
    pub(crate) fn produce_each(&mut self, how_many: usize) {
        for p in &mut self.produced {
            *p += how_many;
        }
    }

    /// Items consumed on `port` by the current (or last) work call.
    pub fn consumed(&self, port: usize) -> usize {
        self.consumed.get(port).copied().unwrap_or(0)
    }

    /// Items produced on `port` by the current (or last) work call.
    pub fn produced(&self, port: usize) -> usize {
        self.produced.get(port).copied().unwrap_or(0)
    }

    pub(crate) fn consume_called(&self) -> bool {
        self.consume_called
    }

    pub(crate) fn produce_called(&self) -> bool {
        self.produce_called
    }

    pub fn nitems_read(&self, which_input: usize) -> Result<u64, ProxyError> {
        self.input_port(which_input)?;
        Ok(self.nitems_read[which_input])
    }

    pub fn nitems_written(&self, which_output: usize) -> Result<u64, ProxyError> {
        self.output_port(which_output)?;
        Ok(self.nitems_written[which_output])
    }

    pub fn tag_propagation_policy(&self) -> TagPropagation {
        self.tag_propagation
    }

    pub fn set_tag_propagation_policy(&mut self, policy: TagPropagation) {
        self.tag_propagation = policy;
    }

    pub fn add_item_tag(&mut self, which_output: usize, tag: Tag) -> Result<(), ProxyError> {
        self.output_port(which_output)?;
        self.output_tags[which_output].insert(tag);
        Ok(())
    }

    pub fn get_tags_in_range(
        &self,
        which_input: usize,
        abs_start: u64,
        abs_end: u64,
        key: Option<&Pmt>,
    ) -> Result<Vec<Tag>, ProxyError> {
        self.input_port(which_input)?;
        if abs_start > abs_end {
            return Err(ProxyError::InvalidRange {
                start: abs_start,
                end: abs_end,
            });
        }
        Ok(self.input_tags[which_input].range(abs_start, abs_end, key))
    }

    pub fn check_msg_queue(&self) -> bool {
        self.msg_input.check()
    }

    pub fn pop_msg_queue(&mut self) -> Result<Tag, ProxyError> {
        self.msg_input.pop().ok_or(ProxyError::EmptyQueue)
    }

    pub fn post_msg(&mut self, group: usize, msg: Tag) -> Result<(), ProxyError> {
        if self.msg_outputs.post(group, msg) {
            Ok(())
        } else {
            Err(ProxyError::InvalidMsgGroup {
                group,
                count: self.msg_outputs.group_count(),
            })
        }
    }

    // ---- engine side ----

    /// Attach an upstream tag to input `port`.
    pub fn push_input_tag(&mut self, port: usize, tag: Tag) -> Result<(), ProxyError> {
        self.input_port(port)?;
        self.input_tags[port].insert(tag);
        Ok(())
    }

    pub fn output_tags(&self, port: usize) -> Option<&TagStore> {
        self.output_tags.get(port)
    }

    /// Hand the tags written to output `port` downstream, emptying its store.
    pub fn take_output_tags(&mut self, port: usize) -> Vec<Tag> {
        self.output_tags
            .get_mut(port)
            .map(TagStore::take_all)
            .unwrap_or_default()
    }

    /// The block's own message inbox.
    pub fn msg_queue(&self) -> &MsgQueue {
        &self.msg_input
    }

    pub fn subscribe_msg(&mut self, group: usize, queue: MsgQueue) -> Result<(), ProxyError> {
        if self.msg_outputs.subscribe(group, queue) {
            Ok(())
        } else {
            Err(ProxyError::InvalidMsgGroup {
                group,
                count: self.msg_outputs.group_count(),
            })
        }
    }

    /// Reset pending counters ahead of a work call.
    pub(crate) fn begin_call(&mut self) {
        self.consumed.fill(0);
        self.produced.fill(0);
        self.consume_called = false;
        self.produce_called = false;
    }

    /// Propagate tags over the consumed input range, then advance the
    /// absolute counters by the pending consumption and production.
    ///
    /// Input tags stay stored while they sit inside the next call's history
    /// window.
    pub(crate) fn finish_call(&mut self) {
        let window = self.history as u64 - 1;
        for input in 0..self.ninputs() {
            let start = self.nitems_read[input];
            let end = start + self.consumed[input] as u64;
            self.propagate_tags(input, start, end);
            self.nitems_read[input] = end;
            self.input_tags[input].prune_before(end.saturating_sub(window));
        }
        for (written, produced) in self.nitems_written.iter_mut().zip(&self.produced) {
            *written += *produced as u64;
        }
    }

    fn propagate_tags(&mut self, input: usize, start: u64, end: u64) {
        let targets = match self.tag_propagation {
            TagPropagation::AllToAll => 0..self.noutputs(),
            TagPropagation::OneToOne if input < self.noutputs() => input..input + 1,
            _ => return,
        };
        if targets.is_empty() || start == end {
            return;
        }
        let rate = self.relative_rate;
        for tag in self.input_tags[input].range(start, end, None) {
            let offset = if rate == 1.0 {
                tag.offset
            } else {
                (tag.offset as f64 * rate) as u64
            };
            for out in targets.clone() {
                self.output_tags[out].insert(Tag {
                    offset,
                    ..tag.clone()
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(nin: usize, nout: usize) -> BlockCore {
        let ins = IoSignature::new(nin, nin, 4).unwrap();
        let outs = IoSignature::new(nout, nout, 4).unwrap();
        BlockCore::new("core", ins, outs, 1)
    }

    #[test]
    fn unique_ids_differ() {
        let a = core(1, 1);
        let b = core(1, 1);
        assert_ne!(a.unique_id(), b.unique_id());
        assert_eq!(a.name(), "core");
    }

    #[test]
    fn setters_validate() {
        let mut c = core(1, 1);
        assert_eq!(c.set_history(0), Err(ProxyError::InvalidHistory));
        assert_eq!(c.set_output_multiple(0), Err(ProxyError::InvalidMultiple));
        assert_eq!(c.set_relative_rate(-1.0), Err(ProxyError::InvalidRate(-1.0)));
        assert!(c.set_relative_rate(f64::NAN).is_err());
        c.set_history(8).unwrap();
        c.set_output_multiple(4).unwrap();
        c.set_relative_rate(0.25).unwrap();
        assert_eq!((c.history(), c.output_multiple()), (8, 4));
        assert_eq!(c.relative_rate(), 0.25);
    }

    #[test]
    fn counters_fold_on_finish() {
        let mut c = core(2, 1);
        c.begin_call();
        c.consume(0, 5).unwrap();
        c.consume(1, 3).unwrap();
        c.produce(0, 4).unwrap();
        c.finish_call();
        assert_eq!(c.nitems_read(0), Ok(5));
        assert_eq!(c.nitems_read(1), Ok(3));
        assert_eq!(c.nitems_written(0), Ok(4));

        c.begin_call();
        assert_eq!(c.consumed(0), 0);
        c.consume_each(2);
        c.finish_call();
        assert_eq!(c.nitems_read(0), Ok(7));
        assert_eq!(c.nitems_read(1), Ok(5));
    }

    #[test]
    fn bad_ports_rejected() {
        let mut c = core(1, 1);
        assert!(matches!(c.consume(1, 1), Err(ProxyError::InvalidPort { port: 1, .. })));
        assert!(c.produce(3, 1).is_err());
        assert!(c.nitems_read(2).is_err());
        assert!(c.add_item_tag(1, Tag::new(0, Pmt::Nil, Pmt::Nil)).is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        let c = core(1, 1);
        assert_eq!(
            c.get_tags_in_range(0, 10, 5, None),
            Err(ProxyError::InvalidRange { start: 10, end: 5 })
        );
        assert_eq!(c.get_tags_in_range(0, 5, 5, None), Ok(Vec::new()));
    }

    #[test]
    fn empty_queue_pop_fails() {
        let mut c = core(1, 1);
        assert!(!c.check_msg_queue());
        assert_eq!(c.pop_msg_queue(), Err(ProxyError::EmptyQueue));
        c.msg_queue().post(Tag::new(0, Pmt::symbol("m"), Pmt::Int(1)));
        assert!(c.check_msg_queue());
        assert_eq!(c.pop_msg_queue().map(|m| m.value), Ok(Pmt::Int(1)));
    }

    #[test]
    fn post_to_missing_group_fails() {
        let mut c = core(1, 1);
        let err = c.post_msg(4, Tag::new(0, Pmt::Nil, Pmt::Nil)).unwrap_err();
        assert_eq!(err, ProxyError::InvalidMsgGroup { group: 4, count: 1 });
    }

    #[test]
    fn all_to_all_propagation_rescales() {
        let mut c = core(1, 2);
        c.set_relative_rate(0.5).unwrap();
        c.push_input_tag(0, Tag::new(4, Pmt::symbol("t"), Pmt::Int(1))).unwrap();
        c.push_input_tag(0, Tag::new(9, Pmt::symbol("late"), Pmt::Nil)).unwrap();
        c.begin_call();
        c.consume(0, 8).unwrap();
        c.finish_call();
        for out in 0..2 {
            let tags = c.output_tags(out).unwrap().as_slice();
            assert_eq!(tags.len(), 1);
            assert_eq!(tags[0].offset, 2);
        }
    }

    #[test]
    fn history_window_keeps_tags() {
        let mut c = core(1, 1);
        c.set_history(3).unwrap();
        c.set_tag_propagation_policy(TagPropagation::DontPropagate);
        for off in 0..6 {
            c.push_input_tag(0, Tag::new(off, Pmt::symbol("t"), Pmt::Nil)).unwrap();
        }
        for _ in 0..4 {
            c.begin_call();
            c.consume(0, 1).unwrap();
            c.finish_call();
        }
        // read position 4, window [2, 4)
        let kept: Vec<u64> = c.input_tags[0].as_slice().iter().map(|t| t.offset).collect();
        assert_eq!(kept, vec![2, 3, 4, 5]);
    }

    #[test]
    fn taking_output_tags_empties_store() {
        let mut c = core(1, 1);
        c.add_item_tag(0, Tag::new(1, Pmt::symbol("a"), Pmt::Nil)).unwrap();
        c.add_item_tag(0, Tag::new(0, Pmt::symbol("b"), Pmt::Nil)).unwrap();
        let taken = c.take_output_tags(0);
        assert_eq!(taken.iter().map(|t| t.offset).collect::<Vec<_>>(), vec![0, 1]);
        assert!(c.output_tags(0).unwrap().is_empty());
        assert!(c.take_output_tags(7).is_empty());
    }

    #[test]
    fn one_to_one_and_dont_propagate() {
        let mut c = core(2, 2);
        c.set_tag_propagation_policy(TagPropagation::OneToOne);
        c.push_input_tag(1, Tag::new(0, Pmt::symbol("t"), Pmt::Nil)).unwrap();
        c.begin_call();
        c.consume_each(1);
        c.finish_call();
        assert!(c.output_tags(0).unwrap().is_empty());
        assert_eq!(c.output_tags(1).unwrap().len(), 1);

        c.set_tag_propagation_policy(TagPropagation::DontPropagate);
        c.push_input_tag(0, Tag::new(1, Pmt::symbol("t"), Pmt::Nil)).unwrap();
        c.begin_call();
        c.consume_each(1);
        c.finish_call();
        assert!(c.output_tags(0).unwrap().is_empty());
    }
}
