use super::*;
use anyhow::anyhow;
use shared::domain::RawSensation;
use tokio::sync::Mutex;

const ONE_SECOND_CODE: &str = "0~One~12,10,30,0,0,0,Hit|1~one~";
const SHORT_CODE: &str = "0~Short~12,1,30,0,0,0,Hit|1,2~short~";

struct RecordingSink {
    events: mpsc::UnboundedSender<OutboundEvent>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingSink {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events,
                closed: Arc::new(Mutex::new(false)),
            }),
            rx,
        )
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("recording closed"))
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}

struct TestDevice {
    connection: ConnectionState,
    fail_send_with: Option<String>,
    sends: Arc<Mutex<Vec<(DeviceSlotIndex, Instant)>>>,
    disconnects: Arc<Mutex<u32>>,
}

impl TestDevice {
    fn connected() -> Self {
        Self {
            connection: ConnectionState::Connected,
            fail_send_with: None,
            sends: Arc::new(Mutex::new(Vec::new())),
            disconnects: Arc::new(Mutex::new(0)),
        }
    }

    fn disconnected() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            ..Self::connected()
        }
    }

    fn failing(err: impl Into<String>) -> Self {
        Self {
            fail_send_with: Some(err.into()),
            ..Self::connected()
        }
    }
}

#[async_trait]
impl DeviceGateway for TestDevice {
    async fn configure(&self, _slots: Vec<String>) -> Result<()> {
        Ok(())
    }

    async fn auto_connect(&self) -> Result<ConnectionState> {
        Ok(self.connection)
    }

    async fn send(&self, index: DeviceSlotIndex) -> Result<()> {
        if let Some(err) = &self.fail_send_with {
            return Err(anyhow!(err.clone()));
        }
        self.sends.lock().await.push((index, Instant::now()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.disconnects.lock().await += 1;
        Ok(())
    }

    async fn connection_state(&self) -> ConnectionState {
        self.connection
    }
}

fn sensation(uuid: &str, prefix: &str, cost: &str, code: &str) -> RawSensation {
    RawSensation {
        uuid: uuid.to_string(),
        description: String::new(),
        cost: cost.to_string(),
        prefix: prefix.to_string(),
        code: code.to_string(),
    }
}

fn catalog(records: Vec<RawSensation>) -> Arc<Catalog> {
    Arc::new(Catalog::build(records).expect("catalog"))
}

fn trigger(keyword: &str, request_id: &str) -> InboundEvent {
    InboundEvent::Trigger {
        keyword: keyword.to_string(),
        request_id: request_id.to_string(),
    }
}

#[tokio::test]
async fn unknown_keyword_reports_unrecognized_without_sending() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device.clone(),
        sink,
    );

    engine.handle(trigger("owo99", "req-1")).await;

    let event = events.try_recv().expect("one event");
    assert_eq!(
        event,
        OutboundEvent::TriggerError(TriggerError::unrecognized("req-1"))
    );
    assert!(events.try_recv().is_err());
    assert!(device.sends.lock().await.is_empty());
    assert_eq!(engine.state(), &EngineState::Idle);
}

#[tokio::test]
async fn disconnected_device_reports_disconnected() {
    let device = Arc::new(TestDevice::disconnected());
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device.clone(),
        sink,
    );

    engine.handle(trigger("owo10", "req-2")).await;

    match events.try_recv().expect("one event") {
        OutboundEvent::TriggerError(payload) => {
            assert_eq!(payload.kind, TriggerErrorKind::Disconnected);
            assert_eq!(payload.uuid, "req-2");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(device.sends.lock().await.is_empty());
}

#[tokio::test]
async fn send_failure_surfaces_as_device_error() {
    let device = Arc::new(TestDevice::failing("usb unplugged"));
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device,
        sink,
    );

    engine.handle(trigger("owo10", "req-3")).await;

    match events.try_recv().expect("one event") {
        OutboundEvent::TriggerError(payload) => {
            assert_eq!(payload.kind, TriggerErrorKind::DeviceError);
            assert!(payload.message.contains("usb unplugged"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(engine.state(), &EngineState::Idle);
}

#[tokio::test]
async fn unparsable_duration_fails_only_the_request() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![
            sensation("bad", "owo", "1", "0~Odd~12,later,30,0,0,0,Hit|1~odd~"),
            sensation("good", "owo", "2", SHORT_CODE),
        ]),
        device.clone(),
        sink,
    );

    engine.handle(trigger("owo1", "req-4")).await;
    match events.try_recv().expect("error event") {
        OutboundEvent::TriggerError(payload) => {
            assert_eq!(payload.kind, TriggerErrorKind::InvalidSensation)
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(device.sends.lock().await.is_empty());

    engine.handle(trigger("owo2", "req-5")).await;
    assert!(matches!(
        engine.state(),
        EngineState::Executing {
            slot: DeviceSlotIndex(1),
            ..
        }
    ));
}

#[tokio::test]
async fn trigger_sends_resolved_slot_and_enters_executing() {
    let device = Arc::new(TestDevice::connected());
    let (sink, _events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![
            sensation("broken", "owo", "5", "0~Broken~1,2,3|4~b~"),
            sensation("a", "owo", "10", SHORT_CODE),
            sensation("b", "owo", "20", ONE_SECOND_CODE),
        ]),
        device.clone(),
        sink,
    );

    engine.handle(trigger("owo20", "req-6")).await;

    let sends = device.sends.lock().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, DeviceSlotIndex(1));
    match engine.state() {
        EngineState::Executing {
            slot,
            request_id,
            ends_at,
        } => {
            assert_eq!(*slot, DeviceSlotIndex(1));
            assert_eq!(request_id.as_deref(), Some("req-6"));
            assert!(*ends_at >= sends[0].1 + Duration::from_millis(990));
        }
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn sequential_triggers_do_not_overlap() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let engine = DispatchEngine::new(
        catalog(vec![
            sensation("a", "owo", "10", ONE_SECOND_CODE),
            sensation("b", "owo", "20", SHORT_CODE),
        ]),
        device.clone(),
        sink,
    );
    let (router, lanes) = inbound_lanes();
    assert!(router.route(trigger("owo10", "first")));
    assert!(router.route(trigger("owo20", "second")));

    let running = tokio::spawn(engine.run(lanes));

    assert_eq!(
        events.recv().await.expect("first response"),
        OutboundEvent::TriggerResponse {
            request_id: "first".to_string()
        }
    );
    assert_eq!(
        events.recv().await.expect("second response"),
        OutboundEvent::TriggerResponse {
            request_id: "second".to_string()
        }
    );

    {
        let sends = device.sends.lock().await;
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].0, DeviceSlotIndex(0));
        assert_eq!(sends[1].0, DeviceSlotIndex(1));
        assert!(sends[1].1.duration_since(sends[0].1) >= Duration::from_secs(1));
    }

    assert!(router.route(InboundEvent::Stop {
        reason: "done".to_string()
    }));
    let exit = running.await.expect("join").expect("run");
    assert_eq!(
        exit,
        EngineExit::Stopped {
            reason: "done".to_string()
        }
    );
}

#[tokio::test]
async fn stop_is_serviced_while_executing() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let closed = sink.closed.clone();
    let engine = DispatchEngine::new(
        catalog(vec![sensation(
            "long",
            "owo",
            "10",
            "0~Long~12,600,30,0,0,0,Hit|1~long~",
        )]),
        device.clone(),
        sink,
    );
    let (router, lanes) = inbound_lanes();
    router.route(trigger("owo10", "slow"));
    let running = tokio::spawn(engine.run(lanes));

    while device.sends.lock().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    router.route(InboundEvent::Stop {
        reason: "shutdown".to_string(),
    });

    let exit = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("stop must not wait for the sensation")
        .expect("join")
        .expect("run");
    assert!(matches!(exit, EngineExit::Stopped { .. }));
    assert_eq!(*device.disconnects.lock().await, 1);
    assert!(*closed.lock().await);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_event_sends_first_slot_without_response() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device.clone(),
        sink,
    );
    let (router, lanes) = inbound_lanes();
    router.route(InboundEvent::Test);
    router.route(trigger("owo10", "after-test"));
    let running = tokio::spawn(engine.run(lanes));

    assert_eq!(
        events.recv().await.expect("response"),
        OutboundEvent::TriggerResponse {
            request_id: "after-test".to_string()
        }
    );
    {
        let sends = device.sends.lock().await;
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].0, DeviceSlotIndex(0));
        assert!(sends[1].1.duration_since(sends[0].1) >= TEST_SENSATION_HOLD);
    }

    drop(router);
    let exit = running.await.expect("join").expect("run");
    assert_eq!(exit, EngineExit::ChannelClosed);
}

#[tokio::test]
async fn test_event_is_skipped_when_disconnected() {
    let device = Arc::new(TestDevice::disconnected());
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device.clone(),
        sink,
    );

    engine.handle(InboundEvent::Test).await;

    assert!(device.sends.lock().await.is_empty());
    assert!(events.try_recv().is_err());
    assert_eq!(engine.state(), &EngineState::Idle);
}

#[tokio::test]
async fn router_sends_stop_to_control_lane() {
    let (router, mut lanes) = inbound_lanes();
    router.route(InboundEvent::Stop {
        reason: "bye".to_string(),
    });
    router.route(InboundEvent::Test);

    assert_eq!(
        lanes.control.try_recv().expect("control"),
        InboundEvent::Stop {
            reason: "bye".to_string()
        }
    );
    assert_eq!(lanes.dispatch.try_recv().expect("dispatch"), InboundEvent::Test);

    drop(lanes);
    assert!(!router.route(InboundEvent::Test));
}

#[tokio::test]
async fn every_queued_trigger_gets_exactly_one_answer() {
    const BURST: usize = 150;

    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let engine = DispatchEngine::new(
        catalog(vec![sensation(
            "zero",
            "owo",
            "10",
            "0~Zero~12,0,30,0,0,0,Hit|1~zero~",
        )]),
        device.clone(),
        sink,
    );
    let (router, lanes) = inbound_lanes();
    for n in 0..BURST {
        let keyword = if n % 3 == 0 { "owo404" } else { "owo10" };
        assert!(router.route(trigger(keyword, &format!("req-{n}"))));
    }
    drop(router);

    let exit = engine.run(lanes).await.expect("run");
    assert_eq!(exit, EngineExit::ChannelClosed);

    let mut answered = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            OutboundEvent::TriggerResponse { request_id } => answered.push(request_id),
            OutboundEvent::TriggerError(payload) => {
                assert_eq!(payload.kind, TriggerErrorKind::Unrecognized);
                answered.push(payload.uuid);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    let expected: Vec<String> = (0..BURST).map(|n| format!("req-{n}")).collect();
    assert_eq!(answered, expected);
    assert_eq!(device.sends.lock().await.len(), BURST - BURST.div_ceil(3));
}

#[tokio::test]
async fn closed_event_channel_disconnects_device() {
    let device = Arc::new(TestDevice::connected());
    let (sink, _events) = RecordingSink::new();
    let closed = sink.closed.clone();
    let engine = DispatchEngine::new(
        catalog(vec![sensation("a", "owo", "10", SHORT_CODE)]),
        device.clone(),
        sink,
    );
    let (router, lanes) = inbound_lanes();
    drop(router);

    let exit = engine.run(lanes).await.expect("run");
    assert_eq!(exit, EngineExit::ChannelClosed);
    assert_eq!(*device.disconnects.lock().await, 1);
    assert!(*closed.lock().await);
}

#[tokio::test]
async fn trigger_while_executing_is_refused_as_busy() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let mut engine = DispatchEngine::new(
        catalog(vec![sensation("b", "owo", "20", ONE_SECOND_CODE)]),
        device.clone(),
        sink,
    );

    engine.handle(trigger("owo20", "playing")).await;
    assert!(matches!(engine.state(), EngineState::Executing { .. }));

    engine.handle(trigger("owo20", "too-early")).await;
    assert_eq!(
        events.try_recv().expect("busy error"),
        OutboundEvent::TriggerError(TriggerError::busy("too-early"))
    );
    assert!(events.try_recv().is_err());
    assert_eq!(device.sends.lock().await.len(), 1);
}

#[tokio::test]
async fn registry_slot_outside_catalog_reports_internal() {
    let device = Arc::new(TestDevice::connected());
    let (sink, mut events) = RecordingSink::new();
    let catalog = Catalog::build(vec![sensation("a", "owo", "10", SHORT_CODE)])
        .expect("catalog")
        .with_dangling_keyword("owo77", DeviceSlotIndex(7));
    let mut engine = DispatchEngine::new(Arc::new(catalog), device.clone(), sink);

    engine.handle(trigger("owo77", "req-ghost")).await;

    match events.try_recv().expect("one event") {
        OutboundEvent::TriggerError(payload) => {
            assert_eq!(payload.kind, TriggerErrorKind::Internal);
            assert_eq!(payload.uuid, "req-ghost");
            assert!(payload.message.contains("slot 7"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.try_recv().is_err());
    assert!(device.sends.lock().await.is_empty());
    assert_eq!(engine.state(), &EngineState::Idle);
}
