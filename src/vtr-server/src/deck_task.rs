// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Deck bridge task: connection lifecycle and state synchronization.
//!
//! One task owns the transport handle, the connection state machine, the
//! reconnect timer and both poll timers. Everything runs on the task's
//! select loop, so state transitions are strictly sequential and a poll
//! tick can never race the teardown that closes the transport.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant, Interval, Sleep};
use tracing::{debug, error, info, warn};

use vtr_backend::{register_builtin_backends_on, DeckAccess, RegistrationContext};
use vtr_core::deck::controller::{
    BridgeEventEmitter, BridgeListener, LinkEvent, LinkStateMachine, PollConfig, ReconnectBackoff,
    ReconnectConfig,
};
use vtr_core::deck::SerialSettings;
use vtr_core::{
    ConnectionState, DeckCommand, DeckError, DeckEvent, DeckRequest, DeckResult, DeckState,
    DeckTransport, DynResult, TimecodeSource,
};

/// Status page window requested by warm-up and poll reads.
const STATUS_SENSE_START: u8 = 0;
const STATUS_SENSE_SIZE: u8 = 10;

/// Bridge settings for one configuration epoch.
///
/// Replaced wholesale on reconfigure; the task never mutates them.
#[derive(Clone)]
pub struct DeckSettings {
    pub backend: String,
    pub access: DeckAccess,
    pub polling: PollConfig,
    pub reconnect: ReconnectConfig,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            backend: "loopback".to_string(),
            access: DeckAccess::Serial(SerialSettings::default()),
            polling: PollConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for the deck task.
pub struct DeckTaskConfig {
    pub registry: Arc<RegistrationContext>,
    pub settings: DeckSettings,
    pub emitter: BridgeEventEmitter,
}

impl Default for DeckTaskConfig {
    fn default() -> Self {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        Self {
            registry: Arc::new(registry),
            settings: DeckSettings::default(),
            emitter: BridgeEventEmitter::new(),
        }
    }
}

/// Listener that reports bridge changes through the log.
pub struct TransitionLogger;

impl BridgeListener for TransitionLogger {
    fn on_connection_change(&self, old: ConnectionState, new: ConnectionState) {
        info!("Connection state: {} -> {}", old, new);
    }

    fn on_status_change(&self, status: &vtr_core::deck::state::StatusSnapshot) {
        debug!("Status flags: {}", status.joined());
    }

    fn on_timecode_change(&self, timecode: vtr_core::Timecode) {
        debug!("Timecode: {}", timecode);
    }

    fn on_device_type(&self, code: u16) {
        info!("Device type: 0x{:x}", code);
    }
}

/// Outcome of a connect attempt, steering the caller's timers.
enum ConnectOutcome {
    /// Transport open; event subscription handed back, polls should start.
    Opened(broadcast::Receiver<DeckEvent>),
    /// Open failed; a reconnect may need scheduling.
    Failed,
    /// Already connecting or connected; nothing to do.
    AlreadyActive,
}

/// Outcome of handling one transport event.
enum EventOutcome {
    Continue,
    /// The link went down; the caller must stop timers and consider a
    /// reconnect.
    LinkDown,
}

struct DeckBridge {
    registry: Arc<RegistrationContext>,
    settings: DeckSettings,
    transport: Option<Box<dyn DeckTransport>>,
    machine: LinkStateMachine,
    state: DeckState,
    backoff: ReconnectBackoff,
    emitter: BridgeEventEmitter,
    state_tx: watch::Sender<DeckState>,
}

impl DeckBridge {
    /// Try to open a fresh transport. Idempotent while an attempt is
    /// already running or the link is up.
    async fn connect(&mut self) -> ConnectOutcome {
        if !self.machine.process_event(LinkEvent::ConnectRequested) {
            debug!("connect ignored; link is {}", self.machine.state());
            return ConnectOutcome::AlreadyActive;
        }
        self.publish_connection();

        // Replace any previous handle before opening a new one.
        self.close_transport().await;

        let mut transport = match self
            .registry
            .build_transport(&self.settings.backend, self.settings.access.clone())
        {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to build deck transport: {}", e);
                return self.fail_open(e.to_string());
            }
        };
        let events = transport.subscribe_events();

        match transport.open().await {
            Ok(()) => {
                self.transport = Some(transport);
                self.machine.process_event(LinkEvent::Opened);
                self.backoff.reset();
                self.state.last_error = None;
                self.publish_connection();
                info!("Deck transport open");
                self.warm_up().await;
                ConnectOutcome::Opened(events)
            }
            Err(e) => {
                error!("Failed to open deck transport: {}", e);
                self.fail_open(e.to_string())
            }
        }
    }

    fn fail_open(&mut self, message: String) -> ConnectOutcome {
        self.machine.process_event(LinkEvent::OpenFailed);
        self.state
            .record_error(DeckError::open_failure(message).to_string());
        self.publish_connection();
        ConnectOutcome::Failed
    }

    /// Best-effort initial queries to populate the cache right after an
    /// open.
    async fn warm_up(&mut self) {
        let queries = [
            DeckCommand::DeviceTypeSense,
            DeckCommand::StatusSense {
                start: STATUS_SENSE_START,
                size: STATUS_SENSE_SIZE,
            },
            DeckCommand::CurrentTimeSense(TimecodeSource::Auto),
        ];
        for cmd in queries {
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            if let Err(e) = transport.send(cmd.clone()).await {
                warn!("Warm-up query {:?} failed (continuing): {}", cmd, e);
            }
        }
    }

    /// Handle one command request from a control surface.
    async fn dispatch(&mut self, req: DeckRequest) {
        let DeckRequest { cmd, respond_to } = req;
        let result = self.send_command(cmd).await;
        if let Err(ref e) = result {
            warn!("Deck command failed: {}", e);
            self.state.record_error(e.to_string());
            self.publish_state();
        }
        let _ = respond_to.send(result);
    }

    async fn send_command(&mut self, cmd: DeckCommand) -> DeckResult<()> {
        if !self.machine.state().is_ok() {
            return Err(DeckError::not_connected());
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(DeckError::not_connected());
        };
        if !transport.is_open() {
            return Err(DeckError::not_connected());
        }

        let label = format!("{:?}", cmd);
        let started = Instant::now();
        match transport.send(cmd).await {
            Ok(()) => {
                debug!("Deck command {} sent in {:?}", label, started.elapsed());
                Ok(())
            }
            Err(e) => Err(DeckError::command(format!("{}: {}", label, e))),
        }
    }

    /// One poll timer tick. A tick that observes a closed transport skips
    /// silently; it lost a race against teardown, which is not a fault.
    async fn poll_tick(&mut self, cmd: DeckCommand) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if !transport.is_open() {
            return;
        }
        if let Err(e) = transport.send(cmd).await {
            debug!("Poll read rejected: {}", e);
        }
    }

    /// Apply one transport event to the cache.
    async fn handle_event(&mut self, event: DeckEvent) -> EventOutcome {
        match event {
            DeckEvent::Status { flags } => {
                self.state.apply_status(flags);
                self.emitter.notify_status_change(&self.state.status);
                self.publish_state();
            }
            DeckEvent::Timecode(tc) => {
                self.state.apply_timecode(tc);
                self.emitter.notify_timecode_change(tc);
                self.publish_state();
            }
            DeckEvent::DeviceType(code) => {
                self.state.apply_device_type(code);
                self.emitter.notify_device_type(code);
                self.publish_state();
            }
            DeckEvent::Ack => debug!("ACK"),
            DeckEvent::Nak { reasons } => {
                let message = format!("NAK: {}", reasons.join(", "));
                warn!("{}", message);
                self.state.record_error(message);
                self.publish_state();
            }
            DeckEvent::PortClosed => {
                info!("Deck port closed");
                self.link_down(LinkEvent::Closed).await;
                return EventOutcome::LinkDown;
            }
            DeckEvent::PortError { message } => {
                error!("Serial error: {}", message);
                self.state
                    .record_error(DeckError::transport_fault(message).to_string());
                self.link_down(LinkEvent::Faulted).await;
                return EventOutcome::LinkDown;
            }
        }
        EventOutcome::Continue
    }

    async fn link_down(&mut self, event: LinkEvent) {
        self.machine.process_event(event);
        self.close_transport().await;
        self.publish_connection();
    }

    /// Tear everything down. Safe from any state, including before the
    /// first successful open, and safe to call twice.
    async fn shutdown(&mut self) {
        self.machine.process_event(LinkEvent::ShutdownRequested);
        if let Some(transport) = self.transport.as_mut() {
            if transport.is_open() {
                if let Err(e) = transport.send(DeckCommand::Stop).await {
                    debug!("Stop on shutdown failed (ignored): {}", e);
                }
            }
        }
        self.close_transport().await;
        self.publish_connection();
    }

    /// Replace the configuration epoch: full teardown, then a fresh
    /// connect with the new settings.
    async fn reconfigure(&mut self, settings: DeckSettings) -> ConnectOutcome {
        info!("Configuration replaced; restarting deck connection");
        self.shutdown().await;
        self.backoff.reset();
        self.settings = settings;
        self.connect().await
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Error closing deck transport (ignored): {}", e);
            }
        }
    }

    /// Publish a connection-state transition (if any) plus the cache.
    fn publish_connection(&mut self) {
        let old = self.state.connection;
        let new = self.machine.state();
        if old != new {
            self.state.set_connection(new);
            self.emitter.notify_connection_change(old, new);
        }
        self.publish_state();
    }

    fn publish_state(&mut self) {
        let _ = self.state_tx.send(self.state.clone());
    }
}

/// Schedule a single reconnect timer. A no-op while one is already
/// pending, so concurrent failure signals cannot stack timers or advance
/// the backoff twice.
fn schedule_reconnect(pending: &mut Option<Pin<Box<Sleep>>>, bridge: &mut DeckBridge) {
    if pending.is_some() {
        return;
    }
    if !bridge.settings.reconnect.is_enabled() {
        return;
    }
    let delay = bridge.backoff.next_delay(&bridge.settings.reconnect);
    info!("Reconnecting in {}ms", delay.as_millis());
    *pending = Some(Box::pin(time::sleep(delay)));
}

/// Build the poll intervals for the current epoch. First tick lands one
/// full period after connect; the warm-up queries cover the gap.
fn make_polls(polling: &PollConfig) -> (Option<Interval>, Option<Interval>) {
    let status = polling.status_enabled().then(|| {
        time::interval_at(
            Instant::now() + polling.status_interval(),
            polling.status_interval(),
        )
    });
    let timecode = polling.timecode_enabled().then(|| {
        time::interval_at(
            Instant::now() + polling.timecode_interval(),
            polling.timecode_interval(),
        )
    });
    (status, timecode)
}

struct Timers {
    reconnect: Option<Pin<Box<Sleep>>>,
    status_poll: Option<Interval>,
    timecode_poll: Option<Interval>,
    events: Option<broadcast::Receiver<DeckEvent>>,
}

impl Timers {
    fn none() -> Self {
        Self {
            reconnect: None,
            status_poll: None,
            timecode_poll: None,
            events: None,
        }
    }

    /// Stop both poll timers and the event subscription. Required on
    /// every path away from Ok, before any reconnect is scheduled.
    fn stop_polling(&mut self) {
        self.status_poll = None;
        self.timecode_poll = None;
        self.events = None;
    }

    fn clear(&mut self) {
        self.reconnect = None;
        self.stop_polling();
    }
}

fn apply_connect_outcome(outcome: ConnectOutcome, timers: &mut Timers, bridge: &mut DeckBridge) {
    match outcome {
        ConnectOutcome::Opened(events) => {
            timers.events = Some(events);
            let (status_poll, timecode_poll) = make_polls(&bridge.settings.polling);
            timers.status_poll = status_poll;
            timers.timecode_poll = timecode_poll;
        }
        ConnectOutcome::Failed => {
            timers.stop_polling();
            schedule_reconnect(&mut timers.reconnect, bridge);
        }
        ConnectOutcome::AlreadyActive => {}
    }
}

/// Run the deck bridge until shutdown is signalled or every request
/// handle is dropped.
pub async fn run_deck_task(
    config: DeckTaskConfig,
    mut rx: mpsc::Receiver<DeckRequest>,
    mut settings_rx: mpsc::Receiver<DeckSettings>,
    state_tx: watch::Sender<DeckState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> DynResult<()> {
    info!("Opening deck backend {}", config.settings.backend);
    match &config.settings.access {
        DeckAccess::Serial(serial) => {
            info!("Serial: {} @ {} baud", serial.path, serial.baud);
        }
    }

    let mut bridge = DeckBridge {
        registry: config.registry,
        settings: config.settings,
        transport: None,
        machine: LinkStateMachine::new(),
        state: DeckState::new(),
        backoff: ReconnectBackoff::new(),
        emitter: config.emitter,
        state_tx,
    };
    let mut timers = Timers::none();
    let mut settings_open = true;

    let outcome = bridge.connect().await;
    apply_connect_outcome(outcome, &mut timers, &mut bridge);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    timers.clear();
                    bridge.shutdown().await;
                    break;
                }
            }

            maybe_req = rx.recv() => {
                let Some(req) = maybe_req else {
                    // All request handles dropped; same teardown as an
                    // explicit shutdown.
                    timers.clear();
                    bridge.shutdown().await;
                    break;
                };
                bridge.dispatch(req).await;
            }

            maybe_settings = settings_rx.recv(), if settings_open => {
                match maybe_settings {
                    Some(settings) => {
                        timers.clear();
                        let outcome = bridge.reconfigure(settings).await;
                        apply_connect_outcome(outcome, &mut timers, &mut bridge);
                    }
                    None => settings_open = false,
                }
            }

            () = async { timers.reconnect.as_mut().expect("guarded by is_some").await },
                if timers.reconnect.is_some() =>
            {
                // Clear the pending marker before connecting.
                timers.reconnect = None;
                let outcome = bridge.connect().await;
                apply_connect_outcome(outcome, &mut timers, &mut bridge);
            }

            _ = async { timers.status_poll.as_mut().expect("guarded by is_some").tick().await },
                if timers.status_poll.is_some() =>
            {
                bridge
                    .poll_tick(DeckCommand::StatusSense {
                        start: STATUS_SENSE_START,
                        size: STATUS_SENSE_SIZE,
                    })
                    .await;
            }

            _ = async { timers.timecode_poll.as_mut().expect("guarded by is_some").tick().await },
                if timers.timecode_poll.is_some() =>
            {
                bridge
                    .poll_tick(DeckCommand::CurrentTimeSense(TimecodeSource::Auto))
                    .await;
            }

            result = async { timers.events.as_mut().expect("guarded by is_some").recv().await },
                if timers.events.is_some() =>
            {
                match result {
                    Ok(event) => {
                        if let EventOutcome::LinkDown = bridge.handle_event(event).await {
                            timers.stop_polling();
                            schedule_reconnect(&mut timers.reconnect, &mut bridge);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Deck event stream lagged; {} events dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Sender gone without a close event; treat it as a
                        // port close.
                        bridge.handle_event(DeckEvent::PortClosed).await;
                        timers.stop_polling();
                        schedule_reconnect(&mut timers.reconnect, &mut bridge);
                    }
                }
            }
        }
    }

    info!("deck task shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    use vtr_core::deck::response::DeckErrorKind;
    use vtr_core::deck::DeckOpFuture;
    use vtr_core::Timecode;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[derive(Default)]
    struct FakeDeckStats {
        open_attempts: u32,
        fail_opens: u32,
        open_now: bool,
        closes: u32,
        sent: Vec<DeckCommand>,
        log: Vec<String>,
    }

    /// Shared script driving every FakeDeck the registry hands out, so a
    /// test can observe transport calls across reconnect attempts.
    #[derive(Clone)]
    struct FakeScript {
        stats: Arc<Mutex<FakeDeckStats>>,
        events: broadcast::Sender<DeckEvent>,
    }

    impl FakeScript {
        fn new() -> Self {
            let (events, _) = broadcast::channel(64);
            Self {
                stats: Arc::new(Mutex::new(FakeDeckStats::default())),
                events,
            }
        }

        fn fail_next_opens(&self, n: u32) {
            self.stats.lock().unwrap().fail_opens = n;
        }

        fn open_attempts(&self) -> u32 {
            self.stats.lock().unwrap().open_attempts
        }

        fn closes(&self) -> u32 {
            self.stats.lock().unwrap().closes
        }

        fn is_open(&self) -> bool {
            self.stats.lock().unwrap().open_now
        }

        fn sent(&self) -> Vec<DeckCommand> {
            self.stats.lock().unwrap().sent.clone()
        }

        fn sent_count(&self) -> usize {
            self.stats.lock().unwrap().sent.len()
        }

        fn log(&self) -> Vec<String> {
            self.stats.lock().unwrap().log.clone()
        }

        fn push_event(&self, event: DeckEvent) {
            let _ = self.events.send(event);
        }

        fn registry(&self) -> Arc<RegistrationContext> {
            let mut ctx = RegistrationContext::new();
            let script = self.clone();
            ctx.register_backend("fake", move |_access| {
                Ok(Box::new(FakeDeck {
                    script: script.clone(),
                }) as Box<dyn DeckTransport>)
            });
            Arc::new(ctx)
        }
    }

    struct FakeDeck {
        script: FakeScript,
    }

    impl DeckTransport for FakeDeck {
        fn open<'a>(&'a mut self) -> DeckOpFuture<'a> {
            let mut stats = self.script.stats.lock().unwrap();
            stats.open_attempts += 1;
            if stats.fail_opens > 0 {
                stats.fail_opens -= 1;
                return Box::pin(async { Err("no such device".into()) });
            }
            stats.open_now = true;
            stats.log.push("open".to_string());
            Box::pin(async { Ok(()) })
        }

        fn close<'a>(&'a mut self) -> DeckOpFuture<'a> {
            let mut stats = self.script.stats.lock().unwrap();
            stats.open_now = false;
            stats.closes += 1;
            stats.log.push("close".to_string());
            Box::pin(async { Ok(()) })
        }

        fn is_open(&self) -> bool {
            self.script.stats.lock().unwrap().open_now
        }

        fn send<'a>(&'a mut self, cmd: DeckCommand) -> DeckOpFuture<'a> {
            let mut stats = self.script.stats.lock().unwrap();
            if !stats.open_now {
                return Box::pin(async { Err("port not open".into()) });
            }
            stats.log.push(format!("send:{:?}", cmd));
            stats.sent.push(cmd);
            Box::pin(async { Ok(()) })
        }

        fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent> {
            self.script.events.subscribe()
        }
    }

    struct Harness {
        deck_tx: mpsc::Sender<DeckRequest>,
        settings_tx: mpsc::Sender<DeckSettings>,
        state_rx: watch::Receiver<DeckState>,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn connection(&self) -> ConnectionState {
            self.state_rx.borrow().connection
        }

        async fn send_cmd(&self, cmd: DeckCommand) -> DeckResult<()> {
            let (tx, rx) = oneshot::channel();
            self.deck_tx
                .send(DeckRequest {
                    cmd,
                    respond_to: tx,
                })
                .await
                .expect("deck task alive");
            rx.await.expect("deck task responded")
        }
    }

    fn reconnect_1s_15s() -> ReconnectConfig {
        ReconnectConfig::new(true, ms(1000), ms(15000))
    }

    fn test_settings(reconnect: ReconnectConfig) -> DeckSettings {
        DeckSettings {
            backend: "fake".to_string(),
            access: DeckAccess::Serial(SerialSettings::default()),
            polling: PollConfig::new(true, ms(500), true, ms(200)),
            reconnect,
        }
    }

    fn spawn_bridge(script: &FakeScript, settings: DeckSettings) -> Harness {
        let (deck_tx, deck_rx) = mpsc::channel(8);
        let (settings_tx, settings_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(DeckState::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = DeckTaskConfig {
            registry: script.registry(),
            settings,
            emitter: BridgeEventEmitter::new(),
        };
        let task = tokio::spawn(async move {
            let _ = run_deck_task(config, deck_rx, settings_rx, state_tx, shutdown_rx).await;
        });
        Harness {
            deck_tx,
            settings_tx,
            state_rx,
            shutdown_tx,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_runs_warm_up_queries() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;

        assert_eq!(h.connection(), ConnectionState::Ok);
        let sent = script.sent();
        assert_eq!(sent[0], DeckCommand::DeviceTypeSense);
        assert_eq!(sent[1], DeckCommand::StatusSense { start: 0, size: 10 });
        assert_eq!(sent[2], DeckCommand::CurrentTimeSense(TimecodeSource::Auto));

        h.shutdown_tx.send(true).unwrap();
        time::sleep(ms(5)).await;
        assert!(h.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_cadence_while_ok() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);
        let warm_up = script.sent_count();

        time::sleep(ms(1010)).await;
        let polls = script.sent().split_off(warm_up);
        let status_polls = polls
            .iter()
            .filter(|c| matches!(c, DeckCommand::StatusSense { .. }))
            .count();
        let timecode_polls = polls
            .iter()
            .filter(|c| matches!(c, DeckCommand::CurrentTimeSense(_)))
            .count();
        assert_eq!(status_polls, 2, "500ms cadence over ~1s");
        assert_eq!(timecode_polls, 5, "200ms cadence over ~1s");
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polls_after_transport_fault() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(ReconnectConfig::disabled()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        script.push_event(DeckEvent::PortError {
            message: "device unplugged".to_string(),
        });
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Error);
        assert!(!script.is_open());

        let before = script.sent_count();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(script.sent_count(), before);
        // Reconnect disabled: the fault must not trigger retries either.
        assert_eq!(script.open_attempts(), 1);
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_rejected_while_disconnected() {
        let script = FakeScript::new();
        script.fail_next_opens(1);
        let h = spawn_bridge(&script, test_settings(ReconnectConfig::disabled()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Error);

        let err = h.send_cmd(DeckCommand::Play).await.unwrap_err();
        assert_eq!(err.kind, DeckErrorKind::NotConnected);
        assert!(script.sent().is_empty(), "no transport calls on rejection");
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_sequence() {
        let script = FakeScript::new();
        script.fail_next_opens(100);
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));

        // Initial attempt fails at t=0; retries land at 1s, 3s, 7s, 15s,
        // 30s (doubling, capped at 15s).
        time::sleep(ms(900)).await;
        assert_eq!(script.open_attempts(), 1);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 2);
        time::sleep(ms(1800)).await;
        assert_eq!(script.open_attempts(), 2);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 3);
        time::sleep(ms(3800)).await;
        assert_eq!(script.open_attempts(), 3);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 4);
        time::sleep(ms(7800)).await;
        assert_eq!(script.open_attempts(), 4);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 5);
        time::sleep(ms(14800)).await;
        assert_eq!(script.open_attempts(), 5);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 6);
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_after_successful_open() {
        let script = FakeScript::new();
        script.fail_next_opens(2);
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));

        // Attempts at t=0 (fail), t=1s (fail), t=3s (success).
        time::sleep(ms(3100)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);
        assert_eq!(script.open_attempts(), 3);

        script.push_event(DeckEvent::PortClosed);
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Disconnected);

        // First retry after a success uses the initial delay, not the
        // previously reached 2s.
        time::sleep(ms(900)).await;
        assert_eq!(script.open_attempts(), 3);
        time::sleep(ms(200)).await;
        assert_eq!(script.open_attempts(), 4);
        assert_eq!(h.connection(), ConnectionState::Ok);
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_burst_schedules_single_retry() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        script.push_event(DeckEvent::PortError {
            message: "burst 1".to_string(),
        });
        script.push_event(DeckEvent::PortClosed);
        script.push_event(DeckEvent::PortError {
            message: "burst 2".to_string(),
        });
        time::sleep(ms(5)).await;
        assert_eq!(script.open_attempts(), 1);

        time::sleep(ms(900)).await;
        assert_eq!(script.open_attempts(), 1);
        time::sleep(ms(200)).await;
        // Exactly one retry, after the initial delay (the burst advanced
        // the backoff once, not three times).
        assert_eq!(script.open_attempts(), 2);
        assert_eq!(h.connection(), ConnectionState::Ok);

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(script.open_attempts(), 2);
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        h.shutdown_tx.send(true).unwrap();
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Disconnected);
        assert!(h.task.is_finished());
        assert!(!script.is_open());
        assert_eq!(script.sent().last(), Some(&DeckCommand::Stop));
        assert_eq!(script.closes(), 1);

        let attempts = script.open_attempts();
        let sent = script.sent_count();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(script.open_attempts(), attempts);
        assert_eq!(script.sent_count(), sent);

        // Signalling shutdown again must not do anything.
        let _ = h.shutdown_tx.send(true);
        time::sleep(ms(5)).await;
        assert_eq!(script.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_reconnect() {
        let script = FakeScript::new();
        script.fail_next_opens(100);
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Error);
        assert_eq!(script.open_attempts(), 1);

        h.shutdown_tx.send(true).unwrap();
        time::sleep(ms(5)).await;
        assert!(h.task.is_finished());
        assert_eq!(h.connection(), ConnectionState::Disconnected);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(script.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_closes_old_transport_before_opening_new() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        let new_settings = DeckSettings {
            polling: PollConfig::new(false, ms(500), false, ms(200)),
            ..test_settings(reconnect_1s_15s())
        };
        h.settings_tx.send(new_settings).await.unwrap();
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        let log = script.log();
        let opens: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == "open")
            .map(|(i, _)| i)
            .collect();
        let closes: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == "close")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(opens.len(), 2);
        assert_eq!(closes.len(), 1);
        assert!(
            closes[0] < opens[1],
            "old transport must close before the new one opens: {:?}",
            log
        );
        let stop_idx = log
            .iter()
            .position(|l| l == "send:Stop")
            .expect("graceful stop before close");
        assert!(stop_idx < closes[0]);

        // The new epoch disabled polling; nothing past its warm-up.
        let count = script.sent_count();
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(script.sent_count(), count);
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_update_cache_and_commands_round_trip() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;

        h.send_cmd(DeckCommand::Play).await.unwrap();
        assert!(script.sent().contains(&DeckCommand::Play));

        script.push_event(DeckEvent::Status {
            flags: vec!["Play".to_string(), "Local".to_string()],
        });
        script.push_event(DeckEvent::Timecode(Timecode::new(1, 2, 3, 4)));
        script.push_event(DeckEvent::DeviceType(0x2025));
        time::sleep(ms(5)).await;

        let state = h.state_rx.borrow().clone();
        assert!(state.flag("PLAY"));
        assert!(!state.flag("RECORD"));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.timecode.as_deref(), Some("01:02:03:04"));
        assert_eq!(snapshot.device_type.as_deref(), Some("0x2025"));

        script.push_event(DeckEvent::Status {
            flags: vec!["Stop".to_string()],
        });
        time::sleep(ms(5)).await;
        assert!(!h.state_rx.borrow().flag("PLAY"));
        drop(h);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_is_recorded_without_connection_change() {
        let script = FakeScript::new();
        let h = spawn_bridge(&script, test_settings(reconnect_1s_15s()));
        time::sleep(ms(5)).await;
        assert_eq!(h.connection(), ConnectionState::Ok);

        script.push_event(DeckEvent::Nak {
            reasons: vec!["CASSETTE OUT".to_string()],
        });
        time::sleep(ms(5)).await;

        let state = h.state_rx.borrow().clone();
        assert_eq!(state.connection, ConnectionState::Ok);
        assert!(state.last_error.unwrap().contains("CASSETTE OUT"));
        assert_eq!(script.open_attempts(), 1);
        drop(h);
    }
}
