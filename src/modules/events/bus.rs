use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::modules::events::broker::{Broker, BrokerStream};
use crate::modules::events::{Event, EventType};
use crate::{raise_error, uid, utc_now};

pub type EventHandler =
    Arc<dyn Fn(Event) -> BoxFuture<'static, MailFusionResult<()>> + Send + Sync>;

/// Wraps an async closure as an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MailFusionResult<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
const STOP_WAIT: Duration = Duration::from_secs(5);

struct BusRuntime {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Broker-backed publish/subscribe with per-type handler fan-out.
pub struct EventBus {
    broker: Arc<dyn Broker>,
    handlers: Arc<DashMap<EventType, Vec<EventHandler>>>,
    resubscribe: Arc<Notify>,
    handler_timeout: Duration,
    runtime: Mutex<Option<BusRuntime>>,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>, handler_timeout: Duration) -> Self {
        Self {
            broker,
            handlers: Arc::new(DashMap::new()),
            resubscribe: Arc::new(Notify::new()),
            handler_timeout,
            runtime: Mutex::new(None),
        }
    }

    /// Stamps id and timestamp when missing and hands the JSON event to the broker.
    pub async fn publish(&self, mut event: Event) -> MailFusionResult<()> {
        if event.id.is_empty() {
            event.id = uid!();
        }
        if event.timestamp <= 0 {
            event.timestamp = utc_now!();
        }
        let payload = serde_json::to_vec(&event).map_err(|e| {
            raise_error!(
                format!("Failed to encode event {}: {}", event.id, e),
                ErrorCode::InternalError
            )
        })?;
        debug!(event_id = %event.id, event_type = %event.event_type, "Publishing event");
        self.broker
            .publish(&event.event_type.topic(), payload)
            .await
    }

    /// Fire-and-forget publish for side notifications; a broker failure is only logged.
    pub async fn emit(&self, event: Event) {
        let event_type = event.event_type;
        if let Err(e) = self.publish(event).await {
            warn!(event_type = %event_type, "Failed to publish event: {}", e);
        }
    }

    /// Registers `handler` for `event_type`. A type seen for the first time
    /// makes the running loop resubscribe.
    pub fn subscribe(&self, event_type: EventType, handler: EventHandler) {
        let is_new_type = {
            let mut entry = self.handlers.entry(event_type).or_default();
            entry.push(handler);
            entry.len() == 1
        };
        if is_new_type {
            self.resubscribe.notify_one();
        }
    }

    pub fn unsubscribe(&self, event_type: EventType) {
        if self.handlers.remove(&event_type).is_some() {
            self.resubscribe.notify_one();
        }
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers
            .get(&event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    /// Subscribes to the registered topics and spawns the dispatch loop.
    ///
    /// The first subscription happens before this returns, so events published
    /// afterwards reach the already-registered handlers.
    pub async fn start(&self) -> MailFusionResult<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(raise_error!(
                "Event bus is already running".into(),
                ErrorCode::MethodNotAllowed
            ));
        }

        // the subscription below already covers every registered type
        let _ = self.resubscribe.notified().now_or_never();
        let initial = match subscribe_registered(&self.broker, &self.handlers).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Initial event subscription failed, retrying in background: {}", e);
                None
            }
        };

        let (cancel, cancel_rx) = watch::channel(false);
        let context = LoopContext {
            broker: self.broker.clone(),
            handlers: self.handlers.clone(),
            resubscribe: self.resubscribe.clone(),
            handler_timeout: self.handler_timeout,
        };
        let handle = tokio::spawn(context.run(cancel_rx, initial));
        *runtime = Some(BusRuntime { cancel, handle });
        info!(broker = self.broker.name(), "Event bus started");
        Ok(())
    }

    /// Ends the receive loop and waits for the handlers it started. Idempotent.
    ///
    /// Aborting the loop task drops its handler set, which aborts the handlers too.
    pub async fn stop(&self) {
        let Some(runtime) = self.runtime.lock().await.take() else {
            return;
        };
        let _ = runtime.cancel.send(true);
        let mut handle = runtime.handle;
        if tokio::time::timeout(STOP_WAIT * 2, &mut handle).await.is_err() {
            warn!("Event bus loop did not exit in time, aborting");
            handle.abort();
            let _ = handle.await;
        }
        info!("Event bus stopped");
    }
}

async fn subscribe_registered(
    broker: &Arc<dyn Broker>,
    handlers: &DashMap<EventType, Vec<EventHandler>>,
) -> MailFusionResult<Option<BrokerStream>> {
    let topics: Vec<String> = handlers.iter().map(|entry| entry.key().topic()).collect();
    if topics.is_empty() {
        return Ok(None);
    }
    debug!("Subscribing to {} event topics", topics.len());
    broker.subscribe(topics).await.map(Some)
}

struct LoopContext {
    broker: Arc<dyn Broker>,
    handlers: Arc<DashMap<EventType, Vec<EventHandler>>>,
    resubscribe: Arc<Notify>,
    handler_timeout: Duration,
}

impl LoopContext {
    async fn run(self, mut cancel: watch::Receiver<bool>, initial: Option<BrokerStream>) {
        let mut running = JoinSet::new();
        self.receive(&mut cancel, initial, &mut running).await;
        if running.is_empty() {
            return;
        }
        debug!("Waiting for {} event handlers", running.len());
        let drained = tokio::time::timeout(STOP_WAIT, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("{} event handlers still running after {:?}, aborting", running.len(), STOP_WAIT);
            running.abort_all();
            while running.join_next().await.is_some() {}
        }
    }

    async fn receive(
        &self,
        cancel: &mut watch::Receiver<bool>,
        mut initial: Option<BrokerStream>,
        running: &mut JoinSet<()>,
    ) {
        loop {
            if *cancel.borrow() {
                return;
            }

            let mut stream = match initial.take() {
                Some(stream) => stream,
                None => match subscribe_registered(&self.broker, &self.handlers).await {
                    Ok(Some(stream)) => stream,
                    Ok(None) => {
                        tokio::select! {
                            _ = self.resubscribe.notified() => continue,
                            _ = cancel.changed() => return,
                        }
                    }
                    Err(e) => {
                        error!("Event subscription failed: {}", e);
                        if sleep_or_cancelled(cancel, RESUBSCRIBE_DELAY).await {
                            return;
                        }
                        continue;
                    }
                },
            };

            loop {
                tokio::select! {
                    _ = cancel.changed() => return,
                    _ = self.resubscribe.notified() => {
                        debug!("Handler set changed, resubscribing");
                        break;
                    }
                    next = stream.next() => match next {
                        Some((topic, payload)) => self.dispatch(&topic, &payload, running),
                        None => {
                            warn!("Broker stream ended, resubscribing in {:?}", RESUBSCRIBE_DELAY);
                            if sleep_or_cancelled(cancel, RESUBSCRIBE_DELAY).await {
                                return;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Runs every handler of the event's type concurrently, each under the handler timeout.
    fn dispatch(&self, topic: &str, payload: &[u8], running: &mut JoinSet<()>) {
        while running.try_join_next().is_some() {}
        let event: Event = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable event on '{}': {}", topic, e);
                return;
            }
        };
        let handlers: Vec<EventHandler> = match self.handlers.get(&event.event_type) {
            Some(entry) => entry.clone(),
            None => return,
        };
        for handler in handlers {
            let event = event.clone();
            let timeout = self.handler_timeout;
            running.spawn(async move {
                let event_id = event.id.clone();
                let event_type = event.event_type;
                match tokio::time::timeout(timeout, handler(event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(event_id = %event_id, event_type = %event_type, "Event handler failed: {}", e)
                    }
                    Err(_) => {
                        warn!(event_id = %event_id, event_type = %event_type, "Event handler timed out after {:?}", timeout)
                    }
                }
            });
        }
    }
}

/// Returns true when cancellation arrived before the delay elapsed.
async fn sleep_or_cancelled(cancel: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancel.changed() => true,
    }
}
