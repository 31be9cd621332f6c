use flowgate::{
    share, Action, BlockProxy, Call, GatewayBlock, GatewayBuilder, GatewayError, Handler,
    HandlerFault, IoSignature, LifecycleHandler, WorkStatus, WORK_CALLED_PRODUCE,
    WORK_INSUFFICIENT_INPUT,
};

fn general_block(handler: flowgate::SharedHandler, nin: usize, nout: usize) -> GatewayBlock {
    let mut builder = GatewayBuilder::new("general");
    if nin > 0 {
        builder = builder.inputs(IoSignature::new(nin, nin, 4).unwrap());
    }
    if nout > 0 {
        builder = builder.outputs(IoSignature::new(nout, nout, 4).unwrap());
    }
    let mut block = builder.build(handler).unwrap();
    assert_eq!(block.start(), Ok(true));
    block
}

/// Needs five items per output item.
struct Framer;

impl LifecycleHandler for Framer {
    fn on_forecast(
        &mut self,
        noutput_items: usize,
        required: &mut [usize],
        _block: &flowgate::BlockCore,
    ) -> Result<(), HandlerFault> {
        required.fill(noutput_items * 5);
        Ok(())
    }

    fn on_work(&mut self, call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        let available = call.record().work()?.ninput_items[0];
        if available < 5 {
            return Ok(WORK_INSUFFICIENT_INPUT);
        }
        let frames = (available / 5).min(call.record().work()?.noutput());
        call.consume(0, frames * 5)?;
        Ok(frames as i64)
    }
}

#[test]
fn short_input_is_starvation() {
    let mut block = general_block(share(Framer), 1, 1);
    let input = [0u8; 12];
    let mut out = [0u8; 16];
    let status = block
        .general_work(4, &[3], &[&input], &mut [&mut out])
        .unwrap();
    assert_eq!(status, WorkStatus::Starved);
    assert_eq!(block.nitems_read(0), Ok(0));
    assert_eq!(block.nitems_written(0), Ok(0));
    assert!(!block.is_faulted());
}

#[test]
fn handler_forecast_and_consumption() {
    let mut block = general_block(share(Framer), 1, 1);
    let mut required = [0usize];
    block.forecast(3, &mut required).unwrap();
    assert_eq!(required, [15]);

    let input = vec![0u8; 12 * 4];
    let mut out = [0u8; 16];
    let status = block
        .general_work(4, &[12], &[&input], &mut [&mut out])
        .unwrap();
    assert_eq!(status, WorkStatus::Produced(2));
    assert_eq!(block.nitems_read(0), Ok(10));
    assert_eq!(block.nitems_written(0), Ok(2));
}

/// Splits a stream onto two outputs with different rates.
struct Splitter;

impl LifecycleHandler for Splitter {
    fn on_work(&mut self, call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        call.produce(0, 3)?;
        call.produce(1, 1)?;
        call.consume_each(3);
        Ok(WORK_CALLED_PRODUCE)
    }
}

#[test]
fn per_port_production() {
    let mut block = general_block(share(Splitter), 1, 2);
    let input = [0u8; 16];
    let mut a = [0u8; 16];
    let mut b = [0u8; 16];
    let status = block
        .general_work(4, &[4], &[&input], &mut [&mut a, &mut b])
        .unwrap();
    assert_eq!(status, WorkStatus::CalledProduce);
    assert_eq!(block.nitems_written(0), Ok(3));
    assert_eq!(block.nitems_written(1), Ok(1));
    assert_eq!(block.nitems_read(0), Ok(3));
}

/// Returns a fixed value from work.
struct Returns(i64);

impl LifecycleHandler for Returns {
    fn on_work(&mut self, _call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        Ok(self.0)
    }
}

#[test]
fn overproduction_is_fatal() {
    let mut block = general_block(share(Returns(5)), 0, 1);
    let mut out = [0u8; 16];
    let err = block.general_work(4, &[], &[], &mut [&mut out]).unwrap_err();
    assert_eq!(
        err,
        GatewayError::Overproduced {
            port: 0,
            produced: 5,
            capacity: 4
        }
    );
    assert!(block.is_faulted());
    assert!(matches!(
        block.general_work(4, &[], &[], &mut [&mut out]),
        Err(GatewayError::Faulted { .. })
    ));
}

#[test]
fn zero_and_other_negatives() {
    let mut block = general_block(share(Returns(0)), 0, 1);
    let mut out = [0u8; 16];
    assert_eq!(
        block.general_work(4, &[], &[], &mut [&mut out]),
        Ok(WorkStatus::Produced(0))
    );

    let mut block = general_block(share(Returns(-7)), 0, 1);
    assert_eq!(
        block.general_work(4, &[], &[], &mut [&mut out]),
        Ok(WorkStatus::Starved)
    );
}

/// Talks to the record directly instead of through `LifecycleHandler`.
#[derive(Default)]
struct Raw {
    residue_refused: bool,
    forecast_extra: bool,
}

impl Handler for Raw {
    fn call(&mut self, call: &mut Call<'_, '_>) -> Result<(), HandlerFault> {
        match call.action() {
            Action::Start => call.record_mut().set_start_return(true)?,
            Action::Stop => call.record_mut().set_stop_return(true)?,
            Action::Forecast => {
                let args = call.record_mut().forecast_mut()?;
                let n = args.noutput_items;
                args.ninput_items_required.fill(n + 1);
                if self.forecast_extra {
                    args.ninput_items_required.push(0);
                }
            }
            Action::Work | Action::GeneralWork => {
                self.residue_refused = call.record().forecast().is_err();
                let n = call.record().work()?.noutput();
                call.record_mut().set_work_return(n as i64)?;
            }
        }
        Ok(())
    }
}

#[test]
fn raw_handler_sees_only_current_group() {
    let raw = share(Raw::default());
    let mut block = general_block(raw.clone(), 1, 1);
    let mut required = [0usize];
    block.forecast(6, &mut required).unwrap();
    assert_eq!(required, [7]);

    let input = [0u8; 28];
    let mut out = [0u8; 24];
    let status = block
        .general_work(6, &[7], &[&input], &mut [&mut out])
        .unwrap();
    assert_eq!(status, WorkStatus::Produced(6));
    assert!(raw.lock().unwrap().residue_refused);
    // general mode consumption is the handler's job
    assert_eq!(block.nitems_read(0), Ok(0));
}

#[test]
fn forecast_shape_checked() {
    let raw = share(Raw {
        forecast_extra: true,
        ..Raw::default()
    });
    let mut block = general_block(raw, 2, 1);
    let mut required = [0usize; 2];
    assert_eq!(
        block.forecast(4, &mut required),
        Err(GatewayError::ForecastShape {
            expected: 2,
            got: 3
        })
    );
}

/// Misuses the proxy, then carries on.
struct Clumsy;

impl LifecycleHandler for Clumsy {
    fn on_work(&mut self, call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        assert!(call.consume(9, 1).is_err());
        assert!(call.pop_msg_queue().is_err());
        assert!(call.set_relative_rate(0.0).is_err());
        Ok(1)
    }
}

#[test]
fn proxy_misuse_does_not_abort_dispatch() {
    let mut block = general_block(share(Clumsy), 0, 1);
    let mut out = [0u8; 4];
    assert_eq!(
        block.general_work(1, &[], &[], &mut [&mut out]),
        Ok(WorkStatus::Produced(1))
    );
    assert_eq!(block.relative_rate(), 1.0);
}

/// Fails outright.
struct Broken;

impl LifecycleHandler for Broken {
    fn on_work(&mut self, _call: &mut Call<'_, '_>) -> Result<i64, HandlerFault> {
        Err(HandlerFault::new("decoder lost sync"))
    }
}

#[test]
fn handler_error_faults_block() {
    let mut block = general_block(share(Broken), 0, 1);
    let mut out = [0u8; 4];
    match block.general_work(1, &[], &[], &mut [&mut out]) {
        Err(GatewayError::HandlerFault { block: name, action, fault }) => {
            assert_eq!(name, "general");
            assert_eq!(action, Action::GeneralWork);
            assert_eq!(fault.message(), "decoder lost sync");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(block.is_faulted());
    assert!(matches!(block.stop(), Err(GatewayError::Faulted { .. })));
}
