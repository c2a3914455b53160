//! Channel Lifecycle Integration Tests
//!
//! Drives the channel manager against a real session server, and against a
//! raw WebSocket server that drops connections without a close handshake.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::SinkExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use ticker_client::{
    BindingFlavor, ChannelError, ChannelManager, ChannelSettings, ChannelState,
    ConfigEndpointResolver, DuplexChannel, Endpoint, StockCallback, StockServiceContract,
    TickerMonitor,
};
use ticker_protocol::{ChangeEvent, FaultCode, STOCK_SERVICE_CONTRACT, ServerMessage, SessionId};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use ticker_service::{
    MarketSimulator, NotificationDispatcher, PriceCatalog, Registry, SessionServer,
    SessionSettings, StdMarketRandomness, StockService,
};

const WAIT: Duration = Duration::from_secs(3);

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    url: String,
    service: Arc<StockService>,
    simulator: Arc<MarketSimulator>,
    cancel: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        let catalog = Arc::new(PriceCatalog::new());
        let registry = Arc::new(Registry::new());
        let service = Arc::new(StockService::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
        ));
        let simulator = Arc::new(MarketSimulator::new(
            catalog,
            Arc::new(NotificationDispatcher::new(registry)),
            Box::new(StdMarketRandomness::seeded(7)),
            Duration::from_secs(3600),
        ));

        let listener = SessionServer::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(SessionServer::new(
            Arc::clone(&service),
            SessionSettings::default(),
        ));
        let cancel = CancellationToken::new();
        tokio::spawn(server.serve(listener, cancel.clone()));

        Self {
            url: format!("ws://{addr}/ticker"),
            service,
            simulator,
            cancel,
        }
    }

    fn manager(&self, settings: ChannelSettings) -> Arc<ChannelManager> {
        manager_for(&self.url, settings)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn manager_for(url: &str, settings: ChannelSettings) -> Arc<ChannelManager> {
    let endpoint =
        Endpoint::parse(STOCK_SERVICE_CONTRACT, url, BindingFlavor::WebSocket).unwrap();
    let resolver = ConfigEndpointResolver::from_endpoints([endpoint]);
    Arc::new(ChannelManager::new(Arc::new(resolver), settings))
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ChangeEvent>>,
    arrived: Notify,
}

impl StockCallback for Recorder {
    fn stock_updated(&self, event: &ChangeEvent) {
        self.events.lock().push(event.clone());
        self.arrived.notify_one();
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Accepts connections, greets them, and drops the first one without a
/// close handshake.
async fn flaky_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let mut ws = accept_async(stream).await.unwrap();
            let welcome = ticker_protocol::encode(&ServerMessage::Welcome {
                session_id: SessionId::generate(),
            })
            .unwrap();
            ws.send(Message::Text(welcome.into())).await.unwrap();
            if n > 1 {
                held.push(ws);
            }
        }
    });

    (format!("ws://{addr}/ticker"), accepted)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn operations_round_trip_and_faults_surface() {
    let harness = Harness::start().await;
    let manager = harness.manager(ChannelSettings::default());
    let channel = manager.acquire::<StockServiceContract>(None).await.unwrap();

    channel.login().await.unwrap();
    let again = channel.login().await.unwrap_err();
    assert_eq!(again.fault().map(|f| f.code), Some(FaultCode::AlreadyLoggedIn));

    channel.add_instrument("acme", Decimal::new(1250, 2)).await.unwrap();
    let quote = channel.get_quote(" Acme ").await.unwrap();
    assert_eq!(quote.symbol, "ACME");
    assert_eq!(quote.price, Decimal::new(1250, 2));

    let duplicate = channel
        .add_instrument("ACME", Decimal::ONE)
        .await
        .unwrap_err();
    assert_eq!(duplicate.fault().map(|f| f.code), Some(FaultCode::DuplicateKey));

    let missing = channel.get_quote("NOPE").await.unwrap_err();
    match missing {
        ChannelError::Fault(fault) => {
            assert_eq!(fault.code, FaultCode::NotFound);
            assert_eq!(fault.reason, "Stock symbol 'NOPE' does not exist.");
        }
        other => panic!("expected fault, got {other:?}"),
    }

    assert!(manager.release::<StockServiceContract>(&channel).await);
    assert!(channel.state().is_terminal());
}

#[tokio::test]
async fn monitoring_channel_receives_pushes() {
    let harness = Harness::start().await;
    harness
        .service
        .add_instrument("IBM", Decimal::new(1500, 2))
        .unwrap();

    let manager = harness.manager(ChannelSettings::default());
    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn StockCallback> = recorder.clone();
    let channel = manager
        .acquire::<StockServiceContract>(Some(callback))
        .await
        .unwrap();
    channel.login().await.unwrap();
    channel.start_ticker_monitoring().await.unwrap();

    let outcome = harness.simulator.tick().await.unwrap();
    assert_eq!(outcome.report.delivered, 1);

    tokio::time::timeout(WAIT, recorder.arrived.notified())
        .await
        .expect("push delivered");
    assert_eq!(recorder.events.lock().as_slice(), &[outcome.event]);
}

#[tokio::test]
async fn logout_closes_channel_and_next_acquire_opens_new_session() {
    let harness = Harness::start().await;
    let manager = harness.manager(ChannelSettings::default());

    let first = manager.acquire::<StockServiceContract>(None).await.unwrap();
    first.login().await.unwrap();
    first.logout(None).await.unwrap();

    eventually(|| first.state() == ChannelState::Closed).await;
    assert!(!harness.service.registry().contains(first.session_id()));

    let second = manager.acquire::<StockServiceContract>(None).await.unwrap();
    assert_ne!(second.id(), first.id());
    assert_ne!(second.session_id(), first.session_id());
    assert_eq!(second.state(), ChannelState::Opened);
}

#[tokio::test]
async fn expired_channel_is_replaced_with_new_session() {
    let harness = Harness::start().await;
    let manager = harness.manager(ChannelSettings {
        expiration: Duration::from_millis(100),
        ..ChannelSettings::default()
    });

    let first = manager.acquire::<StockServiceContract>(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let second = manager.acquire::<StockServiceContract>(None).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_ne!(first.session_id(), second.session_id());
    assert!(first.state().is_terminal());
}

#[tokio::test]
async fn dropped_transport_is_recovered_without_acquire() {
    let (url, accepted) = flaky_server().await;
    let manager = manager_for(&url, ChannelSettings::default());

    let first = manager.acquire::<StockServiceContract>(None).await.unwrap();
    eventually(|| first.state() == ChannelState::Faulted).await;
    eventually(|| accepted.load(Ordering::SeqCst) == 2).await;

    let mut replacement = None;
    for _ in 0..300 {
        replacement = manager.cached_channel_id::<StockServiceContract>().await;
        if replacement.is_some_and(|id| id != first.id()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let replacement = replacement.expect("replacement channel cached");
    assert_ne!(replacement, first.id());

    let current = manager.acquire::<StockServiceContract>(None).await.unwrap();
    assert_eq!(current.id(), replacement);
    assert_eq!(current.state(), ChannelState::Opened);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_endpoint_fails_acquire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = manager_for(&format!("ws://{addr}/ticker"), ChannelSettings::default());
    let result = manager.acquire::<StockServiceContract>(None).await;
    assert!(matches!(result, Err(ChannelError::ConnectionFailed { .. })));
    assert_eq!(
        manager.cached_channel_id::<StockServiceContract>().await,
        None
    );
}

#[tokio::test]
async fn monitor_sets_up_session_once_per_channel() {
    let harness = Harness::start().await;
    let manager = harness.manager(ChannelSettings::default());
    let mut monitor = TickerMonitor::new(Arc::clone(&manager), Arc::new(Recorder::default()));

    assert!(monitor.ensure_session().await.unwrap());
    assert!(!monitor.ensure_session().await.unwrap());

    let stats = harness.service.registry().stats();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.active, 1);

    let session_id = monitor.channel().unwrap().session_id().clone();
    monitor.shutdown().await;
    eventually(|| !harness.service.registry().contains(&session_id)).await;
    assert!(monitor.channel().is_none());
}
