//! In-memory channels for exercising the manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};

use super::{
    ChannelFactory, ChannelId, ChannelSettings, ChannelState, Contract, DuplexChannel,
};
use crate::endpoint::{BindingFlavor, Endpoint, EndpointResolver};
use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Graceful,
    Hang,
    Fail,
}

pub struct FakeChannel {
    id: ChannelId,
    state: watch::Sender<ChannelState>,
    close_behavior: CloseBehavior,
    closes: AtomicUsize,
    aborts: AtomicUsize,
}

impl FakeChannel {
    fn new(close_behavior: CloseBehavior) -> Self {
        Self {
            id: ChannelId::next(),
            state: watch::Sender::new(ChannelState::Opened),
            close_behavior,
            closes: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
        }
    }

    pub fn fault(&self) {
        self.state.send_replace(ChannelState::Faulted);
    }

    pub fn peer_close(&self) {
        self.state.send_replace(ChannelState::Closed);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ChannelState::Closed;
                true
            }
        });
    }
}

#[async_trait]
impl DuplexChannel for FakeChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match self.close_behavior {
            CloseBehavior::Graceful => {
                self.finish();
                Ok(())
            }
            CloseBehavior::Hang => std::future::pending().await,
            CloseBehavior::Fail => Err(ChannelError::Faulted),
        }
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.finish();
    }
}

/// Shared test state, handed to the factory as its callback.
pub struct Probe {
    pub factories: AtomicUsize,
    pub opens: AtomicUsize,
    pub fail_opens: AtomicUsize,
    pub close_behavior: Mutex<CloseBehavior>,
    pub opened: Mutex<Vec<Arc<FakeChannel>>>,
    pub gated: AtomicBool,
    pub gate: Notify,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            factories: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            fail_opens: AtomicUsize::new(0),
            close_behavior: Mutex::new(CloseBehavior::Graceful),
            opened: Mutex::new(Vec::new()),
            gated: AtomicBool::new(false),
            gate: Notify::new(),
        })
    }

    pub fn factories(&self) -> usize {
        self.factories.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    pub fn last_opened(&self) -> Option<Arc<FakeChannel>> {
        self.opened.lock().last().cloned()
    }
}

pub struct FakeFactory {
    probe: Arc<Probe>,
    endpoint: Endpoint,
}

#[async_trait]
impl ChannelFactory for FakeFactory {
    type Channel = FakeChannel;

    async fn open(&self) -> Result<Arc<FakeChannel>, ChannelError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.probe.gated.load(Ordering::SeqCst) {
            self.probe.gate.notified().await;
        }
        let failing = self
            .probe
            .fail_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChannelError::ConnectionFailed {
                url: self.endpoint.url(),
                reason: "refused".to_string(),
            });
        }
        let behavior = *self.probe.close_behavior.lock();
        let channel = Arc::new(FakeChannel::new(behavior));
        self.probe.opened.lock().push(Arc::clone(&channel));
        Ok(channel)
    }
}

pub struct FakeContract<const N: u8>;

impl<const N: u8> Contract for FakeContract<N> {
    const NAME: &'static str = match N {
        0 => "IQuotes",
        1 => "IOrders",
        _ => "IUnconfigured",
    };
    type Callback = Probe;
    type Factory = FakeFactory;

    fn create_factory(
        endpoint: Endpoint,
        callback: Option<Arc<Probe>>,
        _settings: &ChannelSettings,
    ) -> Result<FakeFactory, ChannelError> {
        let probe = callback.ok_or_else(|| ChannelError::Config("probe required".to_string()))?;
        probe.factories.fetch_add(1, Ordering::SeqCst);
        Ok(FakeFactory { probe, endpoint })
    }
}

pub type Quotes = FakeContract<0>;
pub type Orders = FakeContract<1>;
pub type Unconfigured = FakeContract<2>;

#[derive(Default)]
pub struct FakeResolver {
    resolves: AtomicUsize,
}

impl FakeResolver {
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

impl EndpointResolver for FakeResolver {
    fn resolve(&self, contract: &str) -> Result<Endpoint, ChannelError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        match contract {
            "IQuotes" | "IOrders" => {
                Endpoint::parse(contract, "ws://localhost:9/fake", BindingFlavor::WebSocket)
            }
            other => Err(ChannelError::ChannelUnavailable(other.to_string())),
        }
    }
}
