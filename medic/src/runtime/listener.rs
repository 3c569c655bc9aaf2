//! Push channels and the listener actors that bridge them into a machine
//!
//! A backend publishes on a [`PushChannel`] with no knowledge of who is
//! listening. A machine declares the channels it listens to; for each one a
//! [`ListenerActor`] holds a [`SubscriptionGuard`] for as long as the machine
//! runs and forwards every payload as a machine event.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, SpawnErr};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::machine_actor::MachineMsg;
use super::Machine;

// ============================================================================
// Push Channel
// ============================================================================

#[derive(Debug, Default)]
struct SubscriptionStats {
    active: AtomicUsize,
    released: AtomicUsize,
}

/// Named broadcast channel for unsolicited backend notifications.
pub struct PushChannel<T> {
    name: &'static str,
    sender: broadcast::Sender<T>,
    stats: Arc<SubscriptionStats>,
}

impl<T> Clone for PushChannel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> std::fmt::Debug for PushChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannel")
            .field("name", &self.name)
            .field("receivers", &self.sender.receiver_count())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<T: Clone + Send + 'static> PushChannel<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name,
            sender,
            stats: Arc::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish to every current subscriber. Returns how many received it;
    /// a push with no subscriber is dropped.
    pub fn publish(&self, payload: T) -> usize {
        match self.sender.send(payload) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!(channel = self.name, "Push dropped; no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> (broadcast::Receiver<T>, SubscriptionGuard) {
        self.stats.active.fetch_add(1, Ordering::SeqCst);
        let guard = SubscriptionGuard {
            channel: self.name,
            stats: Arc::clone(&self.stats),
            pump: None,
        };
        (self.sender.subscribe(), guard)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Total number of subscriptions released since the channel was created.
    pub fn released_subscriptions(&self) -> usize {
        self.stats.released.load(Ordering::SeqCst)
    }
}

/// Releases a subscription when dropped. Dropping is the only way to release,
/// so it happens exactly once.
pub struct SubscriptionGuard {
    channel: &'static str,
    stats: Arc<SubscriptionStats>,
    pump: Option<AbortHandle>,
}

impl SubscriptionGuard {
    /// Tie the task draining the receiver to this subscription.
    pub fn attach(&mut self, pump: AbortHandle) {
        if let Some(previous) = self.pump.replace(pump) {
            previous.abort();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(channel = self.channel, "Subscription released");
    }
}

// ============================================================================
// Listener Actor
// ============================================================================

pub struct ListenerActor<M: Machine, T> {
    _marker: PhantomData<fn() -> (M, T)>,
}

impl<M: Machine, T> Default for ListenerActor<M, T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

pub struct ListenerArgs<M: Machine, T> {
    pub channel: PushChannel<T>,
    pub host: ActorRef<MachineMsg<M>>,
    pub translate: fn(T) -> M::Event,
}

pub enum ListenerMsg<T> {
    Notification(T),
    Lagged(u64),
    SourceClosed,
}

pub struct ListenerState<M: Machine, T> {
    channel: &'static str,
    host: ActorRef<MachineMsg<M>>,
    translate: fn(T) -> M::Event,
    guard: Option<SubscriptionGuard>,
}

#[async_trait]
impl<M, T> Actor for ListenerActor<M, T>
where
    M: Machine,
    T: Clone + Send + Sync + 'static,
{
    type Msg = ListenerMsg<T>;
    type State = ListenerState<M, T>;
    type Arguments = ListenerArgs<M, T>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (mut rx, mut guard) = args.channel.subscribe();

        let pump = tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(payload) => ListenerMsg::Notification(payload),
                    Err(broadcast::error::RecvError::Lagged(n)) => ListenerMsg::Lagged(n),
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = myself.cast(ListenerMsg::SourceClosed);
                        break;
                    }
                };
                if myself.cast(msg).is_err() {
                    break;
                }
            }
        });
        guard.attach(pump.abort_handle());

        tracing::debug!(machine = M::ID, channel = args.channel.name(), "Listener started");
        Ok(ListenerState {
            channel: args.channel.name(),
            host: args.host,
            translate: args.translate,
            guard: Some(guard),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ListenerMsg::Notification(payload) => {
                let event = (state.translate)(payload);
                if let Err(e) = state.host.cast(MachineMsg::Event(event)) {
                    tracing::debug!(channel = state.channel, error = %e, "Host gone; stopping listener");
                    myself.stop(None);
                }
            }
            ListenerMsg::Lagged(missed) => {
                tracing::warn!(channel = state.channel, missed, "Listener lagged behind push channel");
            }
            ListenerMsg::SourceClosed => {
                tracing::info!(channel = state.channel, "Push channel closed");
                myself.stop(Some("push channel closed".to_string()));
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        drop(state.guard.take());
        Ok(())
    }
}

type ListenFn<M> =
    Box<dyn FnOnce(ActorRef<MachineMsg<M>>) -> BoxFuture<'static, Result<ActorCell, SpawnErr>> + Send>;

/// A push channel a machine listens to for its whole lifetime.
pub struct Listen<M: Machine> {
    name: &'static str,
    spawn: ListenFn<M>,
}

impl<M: Machine> Listen<M> {
    pub fn on<T>(channel: &PushChannel<T>, translate: fn(T) -> M::Event) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let channel = channel.clone();
        Self {
            name: channel.name(),
            spawn: Box::new(move |host: ActorRef<MachineMsg<M>>| {
                async move {
                    let supervisor = host.get_cell();
                    let (actor, _handle) = Actor::spawn_linked(
                        None,
                        ListenerActor::<M, T>::default(),
                        ListenerArgs {
                            channel,
                            host,
                            translate,
                        },
                        supervisor,
                    )
                    .await?;
                    Ok(actor.get_cell())
                }
                .boxed()
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) async fn spawn(self, host: ActorRef<MachineMsg<M>>) -> Result<ActorCell, SpawnErr> {
        (self.spawn)(host).await
    }
}
