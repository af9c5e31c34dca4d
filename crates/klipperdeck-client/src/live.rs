//! Push channel: the Moonraker WebSocket subscription.
//!
//! A background task owns the socket. It subscribes to every consumed
//! subsystem on open, forwards each JSON message, and reconnects after a loss
//! until [`LivePolicy::max_reconnects`] consecutive attempts have failed.
//! Closing the [`LiveSubscription`] (or dropping it) sends a normal close
//! frame and never triggers a reconnect.

use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use klipperdeck_core::subsystems::subscription_objects;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const EVENT_BUFFER: usize = 64;

/// Reconnect behaviour for the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivePolicy {
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
}

impl Default for LivePolicy {
    fn default() -> Self {
        Self {
            max_reconnects: 3,
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Something that happened on the push channel.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// The socket is open and the subscription request went out.
    Opened,
    /// One decoded message from the host.
    Message(Value),
    /// The socket was lost; a reconnect is scheduled.
    Reconnecting { attempt: u32, max: u32 },
    /// Reconnects are used up. No further events follow.
    Exhausted(TransportError),
}

/// Receiving end of a push subscription.
#[derive(Debug)]
pub struct LiveSubscription {
    events: mpsc::Receiver<LiveEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    /// Next event, or `None` once the channel is finished.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Ask the channel to close with a normal close frame.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Close and wait until the socket task has finished.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }

    /// A subscription driven by hand instead of a socket.
    pub fn channel(capacity: usize) -> (LiveFeed, LiveSubscription) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            LiveFeed {
                events: events_tx,
                shutdown: shutdown_rx,
                closed: false,
            },
            LiveSubscription {
                events: events_rx,
                shutdown: Some(shutdown_tx),
                task: None,
            },
        )
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sending end of [`LiveSubscription::channel`].
#[derive(Debug)]
pub struct LiveFeed {
    events: mpsc::Sender<LiveEvent>,
    shutdown: oneshot::Receiver<()>,
    closed: bool,
}

impl LiveFeed {
    /// Deliver an event. Returns false once the subscriber is gone.
    pub async fn send(&self, event: LiveEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Whether the subscriber closed or dropped its end.
    pub fn is_closed(&mut self) -> bool {
        if !self.closed {
            self.closed = !matches!(
                self.shutdown.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            ) || self.events.is_closed();
        }
        self.closed
    }
}

pub(crate) fn spawn(url: String, policy: LivePolicy) -> LiveSubscription {
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(url, policy, events_tx, shutdown_rx));
    LiveSubscription {
        events: events_rx,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

/// The JSON-RPC request sent right after the socket opens.
pub fn subscribe_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "printer.objects.subscribe",
        "params": { "objects": subscription_objects() },
        "id": 1,
    })
}

enum Ended {
    Shutdown,
    Lost(TransportError),
}

async fn run(
    url: String,
    policy: LivePolicy,
    events: mpsc::Sender<LiveEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut failures = 0u32;

    loop {
        let outcome = tokio::select! {
            _ = &mut shutdown => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        let lost = match outcome {
            Ok((ws, _)) => {
                tracing::info!("Live channel open: {}", url);
                failures = 0;
                match pump(&url, ws, &events, &mut shutdown).await {
                    Ended::Shutdown => return,
                    Ended::Lost(err) => err,
                }
            }
            Err(e) => TransportError::from_ws(&url, e),
        };

        failures += 1;
        if failures > policy.max_reconnects {
            tracing::warn!("Live channel gave up after {} attempts: {}", failures - 1, lost);
            let _ = events.send(LiveEvent::Exhausted(lost)).await;
            return;
        }

        tracing::warn!(
            "Live channel lost ({}), reconnecting {}/{}",
            lost,
            failures,
            policy.max_reconnects
        );
        let scheduled = LiveEvent::Reconnecting {
            attempt: failures,
            max: policy.max_reconnects,
        };
        if events.send(scheduled).await.is_err() {
            return;
        }

        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(policy.reconnect_delay) => {}
        }
    }
}

async fn pump(
    url: &str,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &mpsc::Sender<LiveEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Ended {
    let (mut sink, mut stream) = ws.split();

    let request = Message::Text(subscribe_request().to_string().into());
    if let Err(e) = sink.send(request).await {
        return Ended::Lost(TransportError::from_ws(url, e));
    }
    if events.send(LiveEvent::Opened).await.is_err() {
        return Ended::Shutdown;
    }

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                tracing::debug!("Live channel closed: {}", url);
                return Ended::Shutdown;
            }

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Ended::Lost(TransportError::from_ws(url, e)),
                    None => return Ended::Lost(TransportError::from_message(url, "connection closed".to_string())),
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => {
                            if events.send(LiveEvent::Message(value)).await.is_err() {
                                return Ended::Shutdown;
                            }
                        }
                        Err(e) => tracing::debug!("Ignoring malformed live message: {}", e),
                    },
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| format!("closed by host ({})", u16::from(f.code)))
                            .unwrap_or_else(|| "closed by host".to_string());
                        return Ended::Lost(TransportError::Network {
                            url: url.to_string(),
                            message: reason,
                        });
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn subscribe_request_lists_subsystems() {
        let req = subscribe_request();
        assert_eq!(req["method"], "printer.objects.subscribe");
        let objects = req["params"]["objects"].as_object().unwrap();
        assert!(objects.contains_key("extruder"));
        assert!(objects.contains_key("print_stats"));
    }

    #[tokio::test]
    async fn hand_driven_channel() {
        let (mut feed, mut sub) = LiveSubscription::channel(4);
        assert!(feed.send(LiveEvent::Opened).await);
        assert!(matches!(sub.recv().await, Some(LiveEvent::Opened)));
        assert!(!feed.is_closed());

        sub.close();
        assert!(sub.is_closed());
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn dropped_subscription_closes_feed() {
        let (mut feed, sub) = LiveSubscription::channel(4);
        drop(sub);
        assert!(feed.is_closed());
        assert!(!feed.send(LiveEvent::Opened).await);
    }

    #[tokio::test]
    async fn forwards_messages_then_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // No second accept: the reconnect is refused.
            drop(listener);
            let mut ws = accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(request["method"], "printer.objects.subscribe");

            let update = json!({
                "jsonrpc": "2.0",
                "method": "notify_status_update",
                "params": [{"extruder": {"temperature": 205.0}}, 1.0],
            });
            ws.send(Message::Text(update.to_string().into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let policy = LivePolicy {
            max_reconnects: 1,
            reconnect_delay: Duration::from_millis(10),
        };
        let mut sub = spawn(format!("ws://{addr}/websocket"), policy);

        assert!(matches!(sub.recv().await, Some(LiveEvent::Opened)));
        match sub.recv().await {
            Some(LiveEvent::Message(v)) => {
                assert_eq!(v["params"][0]["extruder"]["temperature"], 205.0)
            }
            other => panic!("expected message, got {other:?}"),
        }
        assert!(matches!(
            sub.recv().await,
            Some(LiveEvent::Reconnecting { attempt: 1, max: 1 })
        ));
        assert!(matches!(sub.recv().await, Some(LiveEvent::Exhausted(_))));
        assert!(sub.recv().await.is_none());

        server.await.unwrap();
    }
}
