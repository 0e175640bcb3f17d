//! Async front end for the multiplexer.
//!
//! One task owns the `Multiplexer` and processes inputs strictly one at a
//! time, so every handler runs to completion before the next message is
//! looked at. Everything else talks to it through a `HubHandle`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use dap_mux_core::{
    AdapterSink, ConsumerId, ConsumerSink, MuxConfig, ProtocolMessage, Request, SessionId,
    TransportError,
};
use dap_mux_session::{Multiplexer, MuxError, Output, Signal};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use uuid::Uuid;

const SIGNAL_CAPACITY: usize = 16;

/// Hub error.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hub is not running")]
    Closed,
    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// Result of attaching a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub session: SessionId,
    pub consumer: ConsumerId,
    /// Whether the consumer drives the primary session.
    pub primary: bool,
}

/// Consumer sink backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<ProtocolMessage>);

impl ChannelSink {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProtocolMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

#[async_trait]
impl ConsumerSink for ChannelSink {
    async fn deliver(&self, message: ProtocolMessage) -> Result<(), TransportError> {
        self.0.send(message).map_err(|_| TransportError::Closed)
    }
}

enum HubInput {
    Attach {
        sink: Arc<dyn ConsumerSink>,
        reply: oneshot::Sender<Result<Attachment, MuxError>>,
    },
    Consumer {
        session: SessionId,
        message: ProtocolMessage,
    },
    Detach {
        consumer: ConsumerId,
    },
    Adapter(ProtocolMessage),
    ReplaceAdapter(Arc<dyn AdapterSink>),
}

/// Owner of the multiplexer and of every live sink.
///
/// After a restart the current adapter connection is considered dead:
/// requests for the adapter are held and adapter input is ignored until
/// a replacement is installed.
pub struct MuxHub {
    mux: Multiplexer,
    adapter: Arc<dyn AdapterSink>,
    /// Requests waiting for a replacement adapter, `None` while connected.
    held: Option<Vec<Request>>,
    consumers: HashMap<ConsumerId, Arc<dyn ConsumerSink>>,
    signals: broadcast::Sender<Signal>,
}

impl MuxHub {
    /// Start the hub task with a fresh primary session.
    #[must_use]
    pub fn spawn(config: MuxConfig, adapter: Arc<dyn AdapterSink>) -> HubHandle {
        let primary_id = Uuid::new_v4();
        let primary_consumer = Uuid::new_v4();
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();

        let hub = Self {
            mux: Multiplexer::new(config, primary_id, primary_consumer),
            adapter,
            held: None,
            consumers: HashMap::new(),
            signals: signals.clone(),
        };
        tracing::info!(session_id = %primary_id, "Multiplexer hub started");
        tokio::spawn(hub.run(rx));

        HubHandle { tx, signals }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubInput>) {
        while let Some(input) = rx.recv().await {
            match input {
                HubInput::Attach { sink, reply } => {
                    let _ = reply.send(self.attach(sink));
                }
                HubInput::Consumer { session, message } => {
                    match self.mux.handle_consumer_message(session, message) {
                        Ok(outputs) => self.emit(outputs).await,
                        Err(e) => {
                            tracing::warn!(session_id = %session, "Consumer message rejected: {e}");
                        }
                    }
                }
                HubInput::Detach { consumer } => {
                    if self.consumers.remove(&consumer).is_some() {
                        tracing::info!(consumer_id = %consumer, "Consumer detached");
                    }
                }
                HubInput::Adapter(message) => {
                    if self.held.is_some() {
                        tracing::debug!(
                            seq = message.seq(),
                            "Ignoring message from replaced adapter"
                        );
                        continue;
                    }
                    match self.mux.handle_adapter_message(message) {
                        Ok(outputs) => self.emit(outputs).await,
                        Err(e) => tracing::warn!("Adapter message rejected: {e}"),
                    }
                }
                HubInput::ReplaceAdapter(adapter) => self.replace_adapter(adapter).await,
            }
        }
        tracing::info!("Multiplexer hub stopped");
    }

    fn attach(&mut self, sink: Arc<dyn ConsumerSink>) -> Result<Attachment, MuxError> {
        let primary = self.mux.primary_session();
        let (primary_id, primary_consumer) = (primary.id(), primary.consumer_id());

        if !self.consumers.contains_key(&primary_consumer) {
            self.consumers.insert(primary_consumer, sink);
            tracing::info!(session_id = %primary_id, "Primary consumer attached");
            return Ok(Attachment {
                session: primary_id,
                consumer: primary_consumer,
                primary: true,
            });
        }

        let session = Uuid::new_v4();
        let consumer = Uuid::new_v4();
        self.mux.add_session(session, consumer)?;
        self.consumers.insert(consumer, sink);
        Ok(Attachment {
            session,
            consumer,
            primary: false,
        })
    }

    async fn emit(&mut self, outputs: Vec<Output>) {
        for output in outputs {
            match output {
                Output::Consumer { consumer, message } => {
                    if let Err(e) = self.deliver(consumer, message).await {
                        tracing::debug!(consumer_id = %consumer, "Delivery skipped: {e}");
                    }
                }
                Output::Adapter(request) => match self.held.as_mut() {
                    Some(held) => held.push(request),
                    None => self.send_to_adapter(request).await,
                },
                Output::Signal(signal) => {
                    if signal == Signal::Restart {
                        let primary = self.mux.primary_session().consumer_id();
                        self.consumers.retain(|id, _| *id == primary);
                        self.held.get_or_insert_with(Vec::new);
                    }
                    tracing::debug!(?signal, "Signal raised");
                    // no subscribers is fine
                    let _ = self.signals.send(signal);
                }
            }
        }
    }

    async fn replace_adapter(&mut self, adapter: Arc<dyn AdapterSink>) {
        self.adapter = adapter;
        let held = self.held.take().unwrap_or_default();
        tracing::info!(held = held.len(), "Adapter connection replaced");
        for request in held {
            self.send_to_adapter(request).await;
        }
    }

    async fn send_to_adapter(&self, request: Request) {
        if let Err(e) = self.adapter.send(request).await {
            tracing::error!("Failed to send request to adapter: {e}");
        }
    }

    async fn deliver(
        &self,
        consumer: ConsumerId,
        message: ProtocolMessage,
    ) -> Result<(), TransportError> {
        let sink = self
            .consumers
            .get(&consumer)
            .ok_or(TransportError::UnknownConsumer(consumer))?;
        sink.deliver(message).await
    }
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubInput>,
    signals: broadcast::Sender<Signal>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle").finish_non_exhaustive()
    }
}

impl HubHandle {
    /// Attach a consumer.
    ///
    /// The first consumer while no primary consumer is attached drives
    /// the primary session; everyone else joins as a collaborator.
    ///
    /// # Errors
    /// Returns error if the hub stopped or a collaborator tries to join
    /// before the adapter is initialized.
    pub async fn attach(&self, sink: Arc<dyn ConsumerSink>) -> Result<Attachment, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubInput::Attach { sink, reply })?;
        Ok(rx.await.map_err(|_| HubError::Closed)??)
    }

    /// Queue a message a consumer sent for `session`.
    ///
    /// # Errors
    /// Returns error if the hub stopped.
    pub fn consumer_message(
        &self,
        session: SessionId,
        message: ProtocolMessage,
    ) -> Result<(), HubError> {
        self.send(HubInput::Consumer { session, message })
    }

    /// Stop delivering to `consumer`. Its session stays registered.
    ///
    /// # Errors
    /// Returns error if the hub stopped.
    pub fn detach(&self, consumer: ConsumerId) -> Result<(), HubError> {
        self.send(HubInput::Detach { consumer })
    }

    /// Queue a message read from the adapter.
    ///
    /// # Errors
    /// Returns error if the hub stopped.
    pub fn adapter_message(&self, message: ProtocolMessage) -> Result<(), HubError> {
        self.send(HubInput::Adapter(message))
    }

    /// Route subsequent adapter requests to `adapter`.
    ///
    /// Requests held since a restart are flushed to it in order.
    ///
    /// # Errors
    /// Returns error if the hub stopped.
    pub fn replace_adapter(&self, adapter: Arc<dyn AdapterSink>) -> Result<(), HubError> {
        self.send(HubInput::ReplaceAdapter(adapter))
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    /// Signals as a stream. Lagged signals are skipped.
    pub fn signals(&self) -> impl Stream<Item = Signal> + Send + Unpin + use<> {
        BroadcastStream::new(self.signals.subscribe()).filter_map(Result::ok)
    }

    /// Pump everything read from an adapter connection into the hub.
    ///
    /// The task ends when the adapter stream ends or the hub stops.
    #[must_use]
    pub fn forward_adapter(
        &self,
        mut messages: mpsc::UnboundedReceiver<ProtocolMessage>,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                if hub.adapter_message(message).is_err() {
                    break;
                }
            }
        })
    }

    fn send(&self, input: HubInput) -> Result<(), HubError> {
        self.tx.send(input).map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dap_mux_core::{Event, Request, Response};
    use serde_json::json;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    struct FakeAdapter(mpsc::UnboundedSender<Request>);

    #[async_trait]
    impl AdapterSink for FakeAdapter {
        async fn send(&self, request: Request) -> Result<(), TransportError> {
            self.0.send(request).map_err(|_| TransportError::Closed)
        }
    }

    fn fake_adapter() -> (Arc<dyn AdapterSink>, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(FakeAdapter(tx)), rx)
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    struct Consumer {
        attachment: Attachment,
        rx: mpsc::UnboundedReceiver<ProtocolMessage>,
    }

    async fn attach(hub: &HubHandle) -> Result<Consumer, HubError> {
        let (sink, rx) = ChannelSink::channel();
        let attachment = hub.attach(Arc::new(sink)).await?;
        Ok(Consumer { attachment, rx })
    }

    /// Drive the primary through `initialize` and return its consumer.
    async fn initialized(
        hub: &HubHandle,
        adapter: &mut mpsc::UnboundedReceiver<Request>,
    ) -> Consumer {
        let mut primary = attach(hub).await.unwrap();
        hub.consumer_message(
            primary.attachment.session,
            Request::new(1, "initialize", None).into(),
        )
        .unwrap();
        let request = next(adapter).await;
        hub.adapter_message(Response::success(1, &request, Some(json!({}))).into())
            .unwrap();
        next(&mut primary.rx).await;
        primary
    }

    #[tokio::test]
    async fn test_first_consumer_is_primary_and_others_wait_for_initialize() {
        let (adapter, mut adapter_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);

        let mut primary = attach(&hub).await.unwrap();
        assert!(primary.attachment.primary);

        let early = attach(&hub).await;
        assert!(matches!(early, Err(HubError::Mux(MuxError::NotJoinable))));

        hub.consumer_message(
            primary.attachment.session,
            Request::new(1, "initialize", None).into(),
        )
        .unwrap();
        let request = next(&mut adapter_rx).await;
        hub.adapter_message(Response::success(1, &request, None).into())
            .unwrap();
        next(&mut primary.rx).await;

        let late = attach(&hub).await.unwrap();
        assert!(!late.attachment.primary);
        assert_ne!(late.attachment.session, primary.attachment.session);
    }

    #[tokio::test]
    async fn test_requests_and_responses_are_renumbered() {
        let (adapter, mut adapter_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);
        let mut signals = hub.signals();

        let mut primary = attach(&hub).await.unwrap();
        hub.consumer_message(
            primary.attachment.session,
            Request::new(7, "initialize", None).into(),
        )
        .unwrap();

        let request = next(&mut adapter_rx).await;
        assert_eq!(request.seq, 1);

        hub.adapter_message(Response::success(40, &request, None).into())
            .unwrap();
        match next(&mut primary.rx).await {
            ProtocolMessage::Response(response) => {
                assert_eq!(response.request_seq, 7);
                assert_eq!(response.seq, 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let signal = timeout(WAIT, signals.next()).await.unwrap();
        assert_eq!(signal, Some(Signal::Joinable));
    }

    #[tokio::test]
    async fn test_collaborator_gets_local_initialize_and_replay() {
        let (adapter, mut adapter_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);
        let mut primary = initialized(&hub, &mut adapter_rx).await;

        let mut event = Event::new("initialized", None);
        event.seq = 2;
        hub.adapter_message(event.into()).unwrap();
        assert!(matches!(next(&mut primary.rx).await, ProtocolMessage::Event(_)));

        let mut collaborator = attach(&hub).await.unwrap();
        hub.consumer_message(
            collaborator.attachment.session,
            Request::new(1, "initialize", None).into(),
        )
        .unwrap();

        assert!(matches!(
            next(&mut collaborator.rx).await,
            ProtocolMessage::Response(ref r) if r.request_seq == 1 && r.seq == 1
        ));
        assert!(matches!(
            next(&mut collaborator.rx).await,
            ProtocolMessage::Event(ref e) if e.event == "initialized" && e.seq == 2
        ));
        assert!(adapter_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_drops_collaborators() {
        let (adapter, mut adapter_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);
        let mut signals = hub.subscribe();
        let mut primary = initialized(&hub, &mut adapter_rx).await;
        assert_eq!(signals.recv().await.unwrap(), Signal::Joinable);

        let mut collaborator = attach(&hub).await.unwrap();

        hub.consumer_message(
            primary.attachment.session,
            Request::new(2, "disconnect", Some(json!({ "restart": true }))).into(),
        )
        .unwrap();
        let request = next(&mut adapter_rx).await;
        hub.adapter_message(Response::success(3, &request, None).into())
            .unwrap();

        assert!(matches!(
            next(&mut collaborator.rx).await,
            ProtocolMessage::Event(ref e) if e.event == "terminated"
        ));
        assert_eq!(
            timeout(WAIT, signals.recv()).await.unwrap().unwrap(),
            Signal::Restart
        );

        // the primary consumer stays bound across the reset
        let again = attach(&hub).await;
        assert!(matches!(again, Err(HubError::Mux(MuxError::NotJoinable))));
        assert!(primary.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_holds_adapter_traffic_until_replaced() {
        let (adapter, mut old_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);
        let mut signals = hub.subscribe();
        let mut primary = initialized(&hub, &mut old_rx).await;
        assert_eq!(signals.recv().await.unwrap(), Signal::Joinable);

        hub.consumer_message(
            primary.attachment.session,
            Request::new(2, "disconnect", Some(json!({ "restart": true }))).into(),
        )
        .unwrap();
        let request = next(&mut old_rx).await;
        hub.adapter_message(Response::success(3, &request, None).into())
            .unwrap();
        assert_eq!(
            timeout(WAIT, signals.recv()).await.unwrap().unwrap(),
            Signal::Restart
        );

        // the primary re-drives initialize before the new adapter is up
        hub.consumer_message(
            primary.attachment.session,
            Request::new(1, "initialize", None).into(),
        )
        .unwrap();
        // late output of the old adapter must not reach anyone
        let mut stale = Event::new("output", Some(json!({ "output": "bye" })));
        stale.seq = 9;
        hub.adapter_message(stale.into()).unwrap();

        let (replacement, mut new_rx) = fake_adapter();
        hub.replace_adapter(replacement).unwrap();

        let request = next(&mut new_rx).await;
        assert_eq!(request.command, "initialize");
        assert_eq!(request.seq, 1);
        assert!(old_rx.try_recv().is_err());

        hub.adapter_message(Response::success(1, &request, None).into())
            .unwrap();
        assert!(matches!(
            next(&mut primary.rx).await,
            ProtocolMessage::Response(ref r) if r.command == "initialize"
        ));
    }

    #[tokio::test]
    async fn test_detached_primary_slot_is_reused() {
        let (adapter, _adapter_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);

        let first = attach(&hub).await.unwrap();
        hub.detach(first.attachment.consumer).unwrap();

        let second = attach(&hub).await.unwrap();
        assert!(second.attachment.primary);
        assert_eq!(second.attachment.session, first.attachment.session);
    }

    #[tokio::test]
    async fn test_replaced_adapter_receives_new_requests() {
        let (adapter, mut old_rx) = fake_adapter();
        let hub = MuxHub::spawn(MuxConfig::new("/w"), adapter);
        let primary = attach(&hub).await.unwrap();

        let (replacement, mut new_rx) = fake_adapter();
        hub.replace_adapter(replacement).unwrap();
        hub.consumer_message(
            primary.attachment.session,
            Request::new(1, "initialize", None).into(),
        )
        .unwrap();

        assert_eq!(next(&mut new_rx).await.command, "initialize");
        assert!(old_rx.try_recv().is_err());
    }
}
