//! Control plane and engine wired together over channels, with a scripted
//! in-memory device standing in for the hardware.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use bedwatch_adaptor::facade::{AdaptorFacade, EngineCommand};
use bedwatch_adaptor::messages::{BusMessage, ControlMessage, ServiceEntry};
use bedwatch_core::events::EventDispatcher;
use bedwatch_core::mock::{MockSessionFactory, ReadScript};
use bedwatch_core::poll::{PollLoop, PollOptions};
use bedwatch_core::session::SessionConfig;
use bedwatch_core::supervisor::ConnectionSupervisor;
use bedwatch_types::{
    BinaryState, Channel, DeviceIdentity, LifecycleState, SampleValue, SubscriberId,
};

async fn next(out: &mut mpsc::Receiver<BusMessage>) -> BusMessage {
    timeout(Duration::from_secs(30), out.recv())
        .await
        .expect("bus went quiet")
        .expect("bus closed")
}

#[tokio::test(start_paused = true)]
async fn adaptor_comes_up_and_delivers_samples() {
    let (out_tx, mut out) = mpsc::channel(64);
    let (eng_tx, mut engine_rx) = mpsc::channel(4);

    let dispatcher = EventDispatcher::default();
    let mut facade = AdaptorFacade::new("bedwatch", "Bed occupancy sensor", 3.0, out_tx, eng_tx);
    tokio::spawn(facade.fan_out().run(dispatcher.subscribe()));

    let factory = MockSessionFactory::new();
    factory.script_reads(vec![
        ReadScript::Ok(vec![1]),
        ReadScript::Ok(vec![0]),
        ReadScript::Ok(vec![1]),
    ]);

    // Parent tells us to start, subscriber says hello and registers.
    facade.handle(ControlMessage::Configure).await;
    assert_eq!(engine_rx.recv().await, Some(EngineCommand::Start));
    facade
        .handle(ControlMessage::AppInit { id: "app1".into() })
        .await;
    facade
        .handle(ControlMessage::AppRequest {
            id: "app1".into(),
            service: vec![ServiceEntry {
                characteristic: Channel::BinarySensor,
                interval: 3.0,
            }],
        })
        .await;
    assert_eq!(facade.state(), LifecycleState::Running);

    // starting notification, descriptor, running notification.
    match next(&mut out).await {
        BusMessage::State(n) => assert_eq!(n.state, LifecycleState::Starting),
        other => panic!("unexpected message: {other:?}"),
    }
    match next(&mut out).await {
        BusMessage::Service(reply) => {
            assert_eq!(reply.destination, SubscriberId::from("app1"));
            assert_eq!(reply.id, "bedwatch");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    match next(&mut out).await {
        BusMessage::State(n) => assert_eq!(n.state, LifecycleState::Running),
        other => panic!("unexpected message: {other:?}"),
    }

    // The runner starts the engine in response to the command.
    let supervisor = ConnectionSupervisor::new(
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF"),
        Box::new(factory),
        SessionConfig::new(),
        dispatcher.clone(),
    );
    let handle = PollLoop::new(supervisor, dispatcher, PollOptions::new()).spawn();

    // The subscriber only asked for occupancy, so the stream it sees is
    // the scripted on, off, on with no status events in between.
    let mut samples = Vec::new();
    while samples.len() < 3 {
        match next(&mut out).await {
            BusMessage::Characteristic(update) => {
                assert_eq!(update.destination, SubscriberId::from("app1"));
                assert_eq!(update.characteristic, Channel::BinarySensor);
                assert!(update.time_stamp > 0.0);
                samples.push(update.data);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert_eq!(
        samples,
        vec![
            SampleValue::Binary(BinaryState::On),
            SampleValue::Binary(BinaryState::Off),
            SampleValue::Binary(BinaryState::On),
        ]
    );

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connected_channel_reaches_its_subscribers() {
    let (out_tx, mut out) = mpsc::channel(64);
    let (eng_tx, _engine_rx) = mpsc::channel(4);

    let dispatcher = EventDispatcher::default();
    let mut facade = AdaptorFacade::new("bedwatch", "Bed occupancy sensor", 3.0, out_tx, eng_tx);
    tokio::spawn(facade.fan_out().run(dispatcher.subscribe()));

    facade
        .handle(ControlMessage::AppRequest {
            id: "monitor".into(),
            service: vec![ServiceEntry {
                characteristic: Channel::Connected,
                interval: 60.0,
            }],
        })
        .await;

    let factory = MockSessionFactory::new();
    factory.fail_next_connects(1);
    let mut supervisor = ConnectionSupervisor::new(
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF"),
        Box::new(factory),
        SessionConfig::new(),
        dispatcher.clone(),
    );

    let _ = supervisor.connect().await;
    supervisor.connect().await.unwrap();

    for expected in [false, true] {
        match next(&mut out).await {
            BusMessage::Characteristic(update) => {
                assert_eq!(update.destination, SubscriberId::from("monitor"));
                assert_eq!(update.characteristic, Channel::Connected);
                assert_eq!(update.data, SampleValue::Connected(expected));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn engine_shutdown_is_clean() {
    let dispatcher = EventDispatcher::default();
    let factory = MockSessionFactory::new();
    let log = factory.call_log();

    let supervisor = ConnectionSupervisor::new(
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF"),
        Box::new(factory),
        SessionConfig::new(),
        dispatcher.clone(),
    );
    let handle = PollLoop::new(supervisor, dispatcher, PollOptions::new()).spawn();

    // Let a few cycles run, then stop the way the runner does.
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.stop().await;

    let calls = log.calls();
    assert_eq!(calls.last(), Some(&"close"));
    assert_eq!(log.count("open"), 1);
}
