use flowgate::{
    share, BlockProxy, Call, GatewayBuilder, GatewayHarness, HandlerFault, IoSignature,
    LifecycleHandler, MsgQueue, Pmt, ProxyError, Tag, WorkStatus,
};

/// Forwards each inbound message to output group 0 with a counter attached.
#[derive(Default)]
struct Relay {
    calls: usize,
    forwarded: i64,
}

impl LifecycleHandler for Relay {
    fn on_work(&mut self, call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        self.calls += 1;
        while call.check_msg_queue() {
            let msg = call.pop_msg_queue()?;
            self.forwarded += 1;
            call.post_msg_kv(0, msg.key, Pmt::pair(msg.value, Pmt::Int(self.forwarded)), None)?;
        }
        Ok(0)
    }
}

#[test]
fn post_check_pop_cycle() {
    let mut block = GatewayBuilder::new("loop")
        .msg_input(true)
        .msg_outputs(1)
        .build(share(Relay::default()))
        .unwrap();
    let inbox = block.msg_inbox().unwrap();
    block.subscribe_msg(0, inbox).unwrap();

    assert!(!block.check_msg_queue());
    block
        .post_msg(0, Tag::new(0, Pmt::symbol("cmd"), Pmt::Int(42)))
        .unwrap();
    assert!(block.check_msg_queue());
    let msg = block.pop_msg_queue().unwrap();
    assert_eq!(msg.key, Pmt::symbol("cmd"));
    assert_eq!(msg.value, Pmt::Int(42));
    assert!(!block.check_msg_queue());
    assert_eq!(block.pop_msg_queue(), Err(ProxyError::EmptyQueue));
}

#[test]
fn unknown_group_rejected() {
    let mut block = GatewayBuilder::new("out-only")
        .msg_outputs(1)
        .build(share(Relay::default()))
        .unwrap();
    assert_eq!(
        block.post_msg(2, Tag::new(0, Pmt::Nil, Pmt::Nil)),
        Err(ProxyError::InvalidMsgGroup { group: 2, count: 1 })
    );
    assert_eq!(
        block.subscribe_msg(1, MsgQueue::new()),
        Err(ProxyError::InvalidMsgGroup { group: 1, count: 1 })
    );
}

#[test]
fn message_only_block_runs_when_mail_arrives() {
    let relay = share(Relay::default());
    let mut block = GatewayBuilder::new("relay")
        .msg_input(true)
        .msg_outputs(1)
        .build(relay.clone())
        .unwrap();
    let downstream = MsgQueue::new();
    block.subscribe_msg(0, downstream.clone()).unwrap();

    let mut h = GatewayHarness::new(block, 0, 0, 0).unwrap();
    h.activate().unwrap();
    assert_eq!(h.run_once(), Ok(WorkStatus::Starved));
    assert_eq!(relay.lock().unwrap().calls, 0);

    h.deliver_msg(Tag::new(0, Pmt::symbol("freq"), Pmt::Double(2.4e9)))
        .unwrap();
    h.deliver_msg(Tag::new(0, Pmt::symbol("gain"), Pmt::Double(30.0)))
        .unwrap();
    assert_eq!(h.run(8), Ok(1));
    assert_eq!(relay.lock().unwrap().calls, 1);

    assert_eq!(downstream.len(), 2);
    let first = downstream.pop().unwrap();
    assert_eq!(first.key, Pmt::symbol("freq"));
    assert_eq!(first.value, Pmt::pair(Pmt::Double(2.4e9), Pmt::Int(1)));
    let second = downstream.pop().unwrap();
    assert_eq!(second.value, Pmt::pair(Pmt::Double(30.0), Pmt::Int(2)));
}

#[test]
fn deliver_without_inbox_fails() {
    let block = GatewayBuilder::new("quiet")
        .msg_outputs(1)
        .build(share(Relay::default()))
        .unwrap();
    let mut h = GatewayHarness::new(block, 0, 0, 0).unwrap();
    assert!(h.deliver_msg(Tag::new(0, Pmt::Nil, Pmt::Nil)).is_err());
}

fn sync_relay(relay: flowgate::SharedHandler, msg_input: bool) -> flowgate::GatewayBlock {
    let sig = IoSignature::new(1, 1, 4).unwrap();
    let mut block = GatewayBuilder::new("sync-relay")
        .inputs(sig.clone())
        .outputs(sig)
        .sync()
        .msg_input(msg_input)
        .msg_outputs(1)
        .build(relay)
        .unwrap();
    assert_eq!(block.start(), Ok(true));
    block
}

#[test]
fn fixed_rate_block_reads_mail_without_input() {
    let relay = share(Relay::default());
    let mut block = sync_relay(relay.clone(), true);
    let downstream = MsgQueue::new();
    block.subscribe_msg(0, downstream.clone()).unwrap();
    block
        .deliver_msg(Tag::new(0, Pmt::symbol("tune"), Pmt::Int(7)))
        .unwrap();

    let mut out = [0u8; 16];
    let status = block
        .general_work(4, &[0], &[&[]], &mut [&mut out])
        .unwrap();
    assert_eq!(status, WorkStatus::Produced(0));
    assert_eq!(relay.lock().unwrap().calls, 1);
    assert!(!block.check_msg_queue());
    assert_eq!(block.nitems_read(0), Ok(0));
    assert_eq!(block.nitems_written(0), Ok(0));
    let forwarded = downstream.pop().unwrap();
    assert_eq!(forwarded.value, Pmt::pair(Pmt::Int(7), Pmt::Int(1)));
}

#[test]
fn fixed_rate_block_without_inbox_starves() {
    let relay = share(Relay::default());
    let mut block = sync_relay(relay.clone(), false);
    let mut out = [0u8; 16];
    let status = block
        .general_work(4, &[0], &[&[]], &mut [&mut out])
        .unwrap();
    assert_eq!(status, WorkStatus::Starved);
    assert_eq!(relay.lock().unwrap().calls, 0);
}
