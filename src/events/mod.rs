//! Events - node events into state changes and UI notifications
//!
//! ```text
//! LightningNode ── NodeEvent ──▶ mpsc ──▶ consumer task (exactly one)
//!                                              │
//!                      ┌───────────────────────┼────────────────────┐
//!                      ▼                       ▼                    ▼
//!                 StateStore             SyncTrigger         Notification sink (UI)
//! ```
//!
//! `subscribe` starts the consumer once; `unsubscribe` stops it and keeps the
//! receiver so a later `subscribe` resumes where it left off.

mod policy;

pub use policy::{AcceptAll, ChannelAcceptPolicy, ChannelDecision, TrustedPeers};

use crate::node::LightningNode;
use crate::payment::PaymentFailureReason;
use crate::state::StateStore;
use crate::types::{now_secs, ChannelState, Payment};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenChannelRequest {
    pub counterparty_node_id: String,
    pub temporary_channel_id: String,
    pub channel_type: String,
    pub funding_sat: u64,
    pub push_sat: u64,
}

/// Everything the node reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    PaymentClaimed { payment_hash: String, amount_sat: u64 },
    OpenChannelRequest(OpenChannelRequest),
    ChannelUpdate { channel_id: String, counterparty_node_id: String },
    /// `amount_sat` is the total of the payment the path belongs to.
    PaymentPathSucceeded { payment_hash: Option<String>, amount_sat: u64 },
    PaymentFailed { payment_hash: String, reason: PaymentFailureReason },
}

pub type EventSink = mpsc::UnboundedSender<NodeEvent>;
pub type EventStream = mpsc::UnboundedReceiver<NodeEvent>;

/// The node's single event channel.
pub fn channel() -> (EventSink, EventStream) { mpsc::unbounded_channel() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerKind { Success, Error }

/// What the UI is told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    PaymentReceived { payment_hash: String, amount_sat: u64 },
    ChannelRequest { counterparty_node_id: String, temporary_channel_id: String, accepted: bool },
    /// `state` is `None` when the channel is not (yet) in the store.
    ChannelStatus { channel_id: String, state: Option<ChannelState> },
    Banner { kind: BannerKind, message: String },
}

pub type NotificationSink = mpsc::UnboundedSender<Notification>;

/// Something that can run a node sync on request.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn trigger_sync(&self);
}

struct Handlers {
    store: Arc<dyn StateStore>,
    node: Arc<dyn LightningNode>,
    sync: Arc<dyn SyncTrigger>,
    policy: RwLock<Arc<dyn ChannelAcceptPolicy>>,
    notifications: NotificationSink,
}

impl Handlers {
    async fn dispatch(&self, event: NodeEvent) {
        match event {
            NodeEvent::PaymentClaimed { payment_hash, amount_sat } => self.payment_claimed(payment_hash, amount_sat).await,
            NodeEvent::OpenChannelRequest(request) => self.open_channel_request(request).await,
            NodeEvent::ChannelUpdate { channel_id, counterparty_node_id } => {
                debug!(%channel_id, %counterparty_node_id, "channel update");
                let state = self.store.channel(&channel_id).map(|c| c.state);
                self.notify(Notification::ChannelStatus { channel_id, state });
                self.sync.trigger_sync().await;
            }
            NodeEvent::PaymentPathSucceeded { payment_hash, amount_sat } => self.payment_sent(payment_hash, amount_sat).await,
            NodeEvent::PaymentFailed { payment_hash, reason } => {
                warn!(%payment_hash, ?reason, "payment failed");
                self.notify(Notification::Banner { kind: BannerKind::Error, message: reason.message().into() });
                self.sync.trigger_sync().await;
            }
        }
    }

    async fn payment_claimed(&self, payment_hash: String, amount_sat: u64) {
        let Some(invoice) = self.store.invoice(&payment_hash) else {
            warn!(%payment_hash, "claimed payment has no matching invoice");
            return;
        };
        if !self.store.record_payment(Payment::received(&invoice, amount_sat, now_secs())) {
            debug!(%payment_hash, "payment already recorded");
            return;
        }
        info!(%payment_hash, amount_sat, "payment received");
        self.sync.trigger_sync().await;
        self.notify(Notification::PaymentReceived { payment_hash, amount_sat });
    }

    async fn payment_sent(&self, payment_hash: Option<String>, amount_sat: u64) {
        if let Some(hash) = &payment_hash {
            if !self.store.record_payment(Payment::sent(hash, amount_sat, now_secs())) {
                debug!(payment_hash = %hash, "payment already recorded");
                return;
            }
        }
        info!(payment_hash = payment_hash.as_deref().unwrap_or("-"), amount_sat, "payment sent");
        self.notify(Notification::Banner { kind: BannerKind::Success, message: "Payment sent".into() });
        self.sync.trigger_sync().await;
    }

    async fn open_channel_request(&self, request: OpenChannelRequest) {
        let policy = self.policy.read().unwrap_or_else(|p| p.into_inner()).clone();
        let accepted = match policy.evaluate(&request) {
            ChannelDecision::Accept => match self.node.accept_inbound_channel(&request).await {
                Ok(()) => true,
                Err(e) => {
                    error!(counterparty = %request.counterparty_node_id, error = %e, "accepting channel failed");
                    false
                }
            },
            ChannelDecision::Reject(reason) => {
                info!(counterparty = %request.counterparty_node_id, %reason, "rejecting channel");
                if let Err(e) = self.node.reject_inbound_channel(&request).await {
                    error!(error = %e, "rejecting channel failed");
                }
                false
            }
        };
        self.sync.trigger_sync().await;
        self.notify(Notification::ChannelRequest {
            counterparty_node_id: request.counterparty_node_id,
            temporary_channel_id: request.temporary_channel_id,
            accepted,
        });
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("notification receiver dropped");
        }
    }
}

enum Consumer {
    Idle(EventStream),
    Running { stop: oneshot::Sender<()>, task: JoinHandle<EventStream> },
    Lost,
}

pub struct EventDispatcher {
    handlers: Arc<Handlers>,
    consumer: Mutex<Consumer>,
}

impl EventDispatcher {
    pub fn new(
        stream: EventStream,
        store: Arc<dyn StateStore>,
        node: Arc<dyn LightningNode>,
        sync: Arc<dyn SyncTrigger>,
        notifications: NotificationSink,
    ) -> Self {
        Self {
            handlers: Arc::new(Handlers { store, node, sync, policy: RwLock::new(Arc::new(AcceptAll)), notifications }),
            consumer: Mutex::new(Consumer::Idle(stream)),
        }
    }

    pub fn with_policy(self, policy: Arc<dyn ChannelAcceptPolicy>) -> Self {
        self.set_policy(policy);
        self
    }

    pub fn set_policy(&self, policy: Arc<dyn ChannelAcceptPolicy>) {
        *self.handlers.policy.write().unwrap_or_else(|p| p.into_inner()) = policy;
    }

    /// Start the consumer. Returns `false` when one is already running.
    pub async fn subscribe(&self) -> bool {
        let mut consumer = self.consumer.lock().await;
        let mut stream = match std::mem::replace(&mut *consumer, Consumer::Lost) {
            Consumer::Idle(stream) => stream,
            running @ Consumer::Running { .. } => {
                *consumer = running;
                debug!("event consumer already running");
                return false;
            }
            Consumer::Lost => {
                error!("event stream lost, cannot subscribe");
                return false;
            }
        };

        let (stop, mut stop_rx) = oneshot::channel();
        let handlers = self.handlers.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    event = stream.recv() => match event {
                        Some(event) => handlers.dispatch(event).await,
                        None => {
                            debug!("event sink closed");
                            break;
                        }
                    },
                }
            }
            stream
        });
        *consumer = Consumer::Running { stop, task };
        info!("event consumer started");
        true
    }

    /// Stop the consumer. Returns `false` when none was running.
    pub async fn unsubscribe(&self) -> bool {
        let mut consumer = self.consumer.lock().await;
        match std::mem::replace(&mut *consumer, Consumer::Lost) {
            Consumer::Running { stop, task } => {
                let _ = stop.send(());
                match task.await {
                    Ok(stream) => *consumer = Consumer::Idle(stream),
                    Err(e) => error!(error = %e, "event consumer panicked"),
                }
                info!("event consumer stopped");
                true
            }
            other => {
                *consumer = other;
                false
            }
        }
    }

    pub async fn is_subscribed(&self) -> bool {
        matches!(*self.consumer.lock().await, Consumer::Running { .. })
    }

    /// Handle one event inline, bypassing the channel.
    pub async fn handle(&self, event: NodeEvent) { self.handlers.dispatch(event).await }
}
