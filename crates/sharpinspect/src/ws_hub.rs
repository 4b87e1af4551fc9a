//! Accepts WebSocket upgrades, tracks live clients, and fans capture events
//! out to them (spec §4.9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use sharpinspect_core::{ConsoleEntryEvent, EventBus, NetworkEntryEvent, PerformanceEntryEvent, SubscriptionToken};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Serialize)]
struct Frame<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: T,
}

struct Client {
    id: u64,
    sender: Arc<AsyncMutex<futures_util::stream::SplitSink<WebSocket, Message>>>,
}

/// Tracks connected clients and serializes one outbound frame per capture
/// event, scheduling an independent send to each client so one slow socket
/// never delays the others (spec §4.9, §5).
pub struct WebSocketHub {
    clients: Arc<SyncMutex<Vec<Client>>>,
    next_client_id: AtomicU64,
    _network_sub: SubscriptionToken,
    _console_sub: SubscriptionToken,
    _performance_sub: SubscriptionToken,
}

impl WebSocketHub {
    pub fn new(bus: Arc<EventBus>) -> Arc<Self> {
        let clients: Arc<SyncMutex<Vec<Client>>> = Arc::new(SyncMutex::new(Vec::new()));

        let network_clients = clients.clone();
        let network_sub = bus.network.subscribe(move |event: &NetworkEntryEvent| {
            broadcast(&network_clients, "network:entry", &event.0);
        });

        let console_clients = clients.clone();
        let console_sub = bus.console.subscribe(move |event: &ConsoleEntryEvent| {
            broadcast(&console_clients, "console:entry", &event.0);
        });

        let performance_clients = clients.clone();
        let performance_sub = bus.performance.subscribe(move |event: &PerformanceEntryEvent| {
            broadcast(&performance_clients, "performance:entry", &event.0);
        });

        Arc::new(Self {
            clients,
            next_client_id: AtomicU64::new(0),
            _network_sub: network_sub,
            _console_sub: console_sub,
            _performance_sub: performance_sub,
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Drive one accepted connection: send the welcome frame, register the
    /// client, then discard everything the client sends until it closes
    /// (spec §4.9: "the WebSocket is broadcast-only for this spec version").
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        use futures_util::{SinkExt, StreamExt};

        let (sink, mut stream) = socket.split();
        let sink = Arc::new(AsyncMutex::new(sink));
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);

        {
            let welcome = Frame {
                kind: "connected",
                data: serde_json::json!({ "message": "Welcome to SharpInspect" }),
            };
            if send_frame(&sink, &welcome).await.is_err() {
                return;
            }
        }

        self.clients.lock().push(Client {
            id,
            sender: sink.clone(),
        });

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // text/binary/ping frames are ignored (spec §6)
                Err(_) => break,
            }
        }

        self.remove_client(id);
        let _ = sink
            .lock()
            .await
            .send(Message::Close(None))
            .await;
    }

    fn remove_client(&self, id: u64) {
        self.clients.lock().retain(|c| c.id != id);
    }

    /// Send a close frame with a 1-second grace per client, then drop them
    /// all. Subscriptions are dropped first so no new events are scheduled
    /// once disposal begins (spec §4.9 `closeAll`).
    pub async fn close_all(&self) {
        let clients: Vec<Client> = std::mem::take(&mut *self.clients.lock());
        for client in clients {
            let sender = client.sender;
            let _ = tokio::time::timeout(Duration::from_secs(1), async move {
                use futures_util::SinkExt;
                let _ = sender.lock().await.send(Message::Close(None)).await;
            })
            .await;
        }
    }
}

async fn send_frame<T: Serialize>(
    sink: &Arc<AsyncMutex<futures_util::stream::SplitSink<WebSocket, Message>>>,
    frame: &Frame<T>,
) -> Result<(), ()> {
    use futures_util::SinkExt;
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.lock().await.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// One independent send task per client — a stuck client's send future
/// parks on that client's own mutex, never the others' (spec §4.9, §5,
/// §9 "Fire-and-forget sends").
fn broadcast<T: Serialize + Clone + Send + 'static>(
    clients: &Arc<SyncMutex<Vec<Client>>>,
    kind: &'static str,
    payload: &T,
) {
    let payload = payload.clone();
    let json = match serde_json::to_string(&Frame { kind, data: payload }) {
        Ok(j) => j,
        Err(_) => return,
    };

    let targets: Vec<(u64, Arc<AsyncMutex<futures_util::stream::SplitSink<WebSocket, Message>>>)> = clients
        .lock()
        .iter()
        .map(|c| (c.id, c.sender.clone()))
        .collect();

    for (id, sender) in targets {
        let json = json.clone();
        let clients = clients.clone();
        tokio::spawn(async move {
            use futures_util::SinkExt;
            let mut guard = sender.lock().await;
            if guard.send(Message::Text(json.into())).await.is_err() {
                drop(guard);
                clients.lock().retain(|c| c.id != id);
            }
        });
    }
}
